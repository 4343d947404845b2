pub mod console;
pub mod form;
pub mod gate;
pub mod loader;
pub mod manifest;
pub mod pipeline;
pub mod render_loop;
pub mod scene;
pub mod thumbnail;
pub mod uploader;
