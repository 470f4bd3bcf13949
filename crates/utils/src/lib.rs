pub mod assets;
pub mod geo;
pub mod logging;
pub mod response;
