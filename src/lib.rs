pub mod stream;
pub mod consumer;
pub mod util;
pub mod test_util;
