pub mod ai;
pub mod config;
pub mod driver;
pub mod dynamics;
pub mod net;
pub mod powertrain;
pub mod race;
pub mod spawn;
pub mod state;
pub mod track;
pub mod verge;
