//! Plain `fs_pipe` + `BufferedStream` demo: writes a line into one end of a
//! pipe and reads it back out the other through the buffered stream layer
//! (`SPEC_FULL.md`'s pipe-I/O supplement).

use ringrt::fs::{fs_pipe, FileChannel};
use ringrt::io::BufferedStream;
use ringrt::rt::{Scheduler, Task};

fn main() {
    tracing_subscriber::fmt::init();

    let scheduler = Scheduler::new(8).expect("failed to create ring");
    let ring = scheduler.ring().clone();

    let line = scheduler.join(Task::new(async move {
        let (reader, writer) = fs_pipe(&ring).expect("pipe");
        let mut writer_stream = BufferedStream::new(FileChannel::new(writer, false));
        let mut reader_stream = BufferedStream::new(FileChannel::new(reader, false));

        writer_stream.putline("roundtrip through a pipe").await.expect("write line");

        let mut out = Vec::new();
        reader_stream.getline(&mut out, b'\n').await.expect("read line");
        out
    }));

    println!("{}", String::from_utf8_lossy(&line));
}
