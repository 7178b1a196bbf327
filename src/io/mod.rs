//! The buffered stream layer (`spec.md` §4.3): a [`RawChannel`] contract
//! wrapped by [`BufferedStream`].

mod buffered;
mod channel;

pub use buffered::BufferedStream;
pub use channel::RawChannel;
