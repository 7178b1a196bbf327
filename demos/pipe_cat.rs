//! Spawns `cat` via the process-builder and pipes a message through it
//! (`spec.md` §6 "other examples spawn `cat` via the process-builder").

use ringrt::fs::{fs_pipe, FileChannel, ProcessBuilder};
use ringrt::io::RawChannel;
use ringrt::rt::{Scheduler, Task};

fn main() {
    tracing_subscriber::fmt::init();

    let scheduler = Scheduler::new(16).expect("failed to create ring");
    let ring = scheduler.ring().clone();

    let output = scheduler.join(Task::new(async move {
        let (child_stdin_r, child_stdin_w) = fs_pipe(&ring).expect("pipe");
        let (child_stdout_r, child_stdout_w) = fs_pipe(&ring).expect("pipe");

        let child = ProcessBuilder::new("cat")
            .stdin(child_stdin_r.raw_fd())
            .stdout(child_stdout_w.raw_fd())
            .spawn()
            .expect("spawn cat");
        drop(child_stdin_r);
        drop(child_stdout_w);

        let mut stdin_chan = FileChannel::new(child_stdin_w, false);
        let message = b"hello from ringrt\n";
        let mut written = 0;
        while written < message.len() {
            written += stdin_chan.write(&message[written..]).await.expect("write to cat");
        }
        stdin_chan.close().await.expect("close cat stdin");

        let mut stdout_chan = FileChannel::new(child_stdout_r, false);
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let n = stdout_chan.read(&mut buf).await.expect("read from cat");
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        child.wait().await.expect("wait for cat");
        out
    }));

    print!("{}", String::from_utf8_lossy(&output));
}
