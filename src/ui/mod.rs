pub mod wayland;
pub mod render;
