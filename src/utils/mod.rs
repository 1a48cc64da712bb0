pub mod audio;
pub mod fallback;
pub mod pacer;
