//! Scenario 3 (`spec.md` §8): an HTML directory listing with entry links
//! and a link back to the parent.

mod support;

#[test]
fn directory_listing_links_entries_and_parent() {
    let dir = support::TempDir::new("dirlist");
    let nested = dir.path().join("some").join("dir");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(nested.join("a.txt"), b"a").unwrap();
    std::fs::write(nested.join("b.txt"), b"b").unwrap();

    support::start_static_server(18083, dir.path().to_string_lossy().into_owned());

    let resp = support::http_request(18083, "GET", "/some/dir/", b"");
    let body = String::from_utf8(resp.body).unwrap();

    assert_eq!(resp.status, 200);
    assert!(body.contains("<a href=\"/some/dir/a.txt\">a.txt</a>"));
    assert!(body.contains("<a href=\"/some/dir/b.txt\">b.txt</a>"));
    assert!(body.contains(">..</a>"));
}
