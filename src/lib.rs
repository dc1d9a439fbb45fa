use std::sync::Arc;

pub mod auth;
pub mod db;
pub mod offer;
pub mod requests;
pub mod resolver;
pub mod routes;

use db::DocumentStore;
use offer::TextGenerator;
use resolver::OrgResolver;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub resolver: Arc<OrgResolver>,
    pub text_gen: Arc<dyn TextGenerator>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, text_gen: Arc<dyn TextGenerator>) -> Self {
        let cache = Arc::new(resolver::OrgCache::new());
        let resolver = Arc::new(OrgResolver::new(Arc::clone(&store), cache));
        AppState {
            store,
            resolver,
            text_gen,
        }
    }
}
