//! Scenario 1 (`spec.md` §8): a handler reads `req.body` and writes it back
//! verbatim with an explicit content type.

mod support;

use ringrt::http::HTTPResponse;
use ringrt::rt::Task;

#[test]
fn echo_handler_round_trips_the_request_body() {
    support::start_custom_server(18081, std::env::temp_dir().to_string_lossy().into_owned(), |router, _scheduler, _config| {
        router.route("POST", "/echo", |io, req| {
            Task::new(async move {
                let mut io = io.borrow_mut();
                let body = io.read_body(&req).to_vec();
                let resp = HTTPResponse::new(200).with_header("Content-Type", "application/octet-stream");
                io.write_header(&resp, Some(body.len())).await?;
                io.write_body(&body).await
            })
        });
    });

    let resp = support::http_request(18081, "POST", "/echo", b"abc");

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"abc");
    assert_eq!(resp.header("content-type"), Some("application/octet-stream"));
}
