pub mod alias;
pub mod file;
pub mod media;

pub use alias::*;
pub use file::*;
pub use media::*;
