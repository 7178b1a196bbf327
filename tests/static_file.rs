//! Scenario 2 (`spec.md` §8): a plain static file under the document root.

mod support;

#[test]
fn static_file_is_served_with_a_guessed_content_type() {
    let dir = support::TempDir::new("static");
    std::fs::write(dir.path().join("hello.txt"), b"hi\n").unwrap();

    support::start_static_server(18082, dir.path().to_string_lossy().into_owned());

    let resp = support::http_request(18082, "GET", "/hello.txt", b"");

    assert_eq!(resp.status, 200);
    assert!(resp.header("content-type").unwrap().starts_with("text/plain"));
    assert_eq!(resp.body, b"hi\n");
}

#[test]
fn missing_file_is_a_404() {
    let dir = support::TempDir::new("static-404");
    support::start_static_server(18085, dir.path().to_string_lossy().into_owned());

    let resp = support::http_request(18085, "GET", "/nope.txt", b"");

    assert_eq!(resp.status, 404);
}
