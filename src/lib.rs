pub mod bytes;
pub mod cipher;
pub mod quartic;
pub mod sqrt_leak;
