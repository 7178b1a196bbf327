//! The example main: serves the current directory at `127.0.0.1:8080`
//! (`spec.md` §6 "CLI (example main)").

use std::rc::Rc;

use ringrt::net::listener_bind;
use ringrt::rt::Scheduler;
use ringrt::server::{serve, with_static_root, Router, ServerConfig};

fn main() {
    tracing_subscriber::fmt::init();

    let scheduler = Scheduler::new(256).expect("failed to create ring");
    let addr = ringrt::net::SocketAddress::parse("127.0.0.1:8080").expect("bad listen address");
    let listener = listener_bind(scheduler.ring(), addr, 128).expect("failed to bind");

    let document_root = std::env::current_dir()
        .expect("failed to read cwd")
        .to_string_lossy()
        .into_owned();
    let config = Rc::new(ServerConfig::new(document_root));
    let router = Rc::new(with_static_root(Router::new(), &scheduler, config.clone()));

    tracing::info!("listening on http://127.0.0.1:8080");
    scheduler.join(ringrt::rt::Task::new(serve(scheduler.clone(), listener, router, config, None)));
}
