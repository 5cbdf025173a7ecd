pub mod broadcast;
pub mod history;
pub mod relay;
pub mod rooms;
pub mod roster;
