mod fifo;

pub use self::fifo::{Capacity, Fifo, FifoError};
