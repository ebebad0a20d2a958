pub mod handlers;
pub mod middleware;
pub mod relay;

use std::sync::Arc;

use crate::relay::MessageRelay;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub relay: MessageRelay,
}
