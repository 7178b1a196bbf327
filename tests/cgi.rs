//! Scenario 4 (`spec.md` §8): an executable under the document root runs as
//! a CGI script, its stdout header block becomes the HTTP response.

mod support;

#[test]
fn cgi_script_sets_status_and_body_from_stdout() {
    let dir = support::TempDir::new("cgi");
    let script_path = dir.path().join("cgi.sh");
    std::fs::write(
        &script_path,
        b"#!/bin/sh\nprintf 'Status: 201\\r\\nContent-Type: text/plain\\r\\n\\r\\nok\\n'\n",
    )
    .unwrap();
    let mut perms = std::fs::metadata(&script_path).unwrap().permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
    std::fs::set_permissions(&script_path, perms).unwrap();

    support::start_static_server(18084, dir.path().to_string_lossy().into_owned());

    let resp = support::http_request(18084, "GET", "/cgi.sh?foo=bar", b"");

    assert_eq!(resp.status, 201);
    assert_eq!(resp.body, b"ok\n");
    assert!(resp.header("content-type").unwrap().starts_with("text/plain"));
}
