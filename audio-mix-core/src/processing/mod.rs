pub mod audio_queue;
pub mod block_pool;
pub mod mix;
