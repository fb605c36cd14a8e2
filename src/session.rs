use std::sync::{Arc, Mutex};

use tracing::info;

/// Holds the access token obtained from the OpenID exchange. A single
/// mutable slot: set after authentication, cleared on logout or when the
/// remote rejects the token. Readers must fetch the value at the point of
/// use, never across an async round trip.
#[derive(Clone, Default)]
pub struct SessionHolder {
    token: Arc<Mutex<Option<String>>>,
}

impl SessionHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: String) {
        *self.token.lock().unwrap() = Some(token);
        info!("access token updated");
    }

    pub fn clear(&self) {
        *self.token.lock().unwrap() = None;
        info!("access token cleared");
    }

    pub fn get(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }
}
