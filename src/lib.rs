pub mod carousel;
pub mod config;
pub mod deck;
pub mod events;
pub mod keyboard;
pub mod layout;
pub mod transition;
pub mod tasks {
    pub mod autoplay;
    pub mod controller;
    pub mod loader;
    pub mod reload;
    pub mod viewer;
}
