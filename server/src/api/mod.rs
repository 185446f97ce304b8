pub mod auth;
pub mod cartridges;
pub mod contests;
pub mod invites;
pub mod jwt;
pub mod leaderboard;
pub mod middleware;
pub mod players;
pub mod server;

pub use server::{build_router, run_api_server, run_api_server_with_listener, ApiState};
