use mockall::mock;

use xvalid::config::EnvProvider;
use xvalid::events::{ParseEvent, ParseObserver};

// Observer whose expectations pin down the order and content of events
mock! {
    pub Observer {}

    impl ParseObserver for Observer {
        fn on_event(&mut self, event: &ParseEvent);
    }
}

// Environment lookups for configuration tests
mock! {
    pub Env {}

    impl EnvProvider for Env {
        fn get(&self, key: &str) -> Option<String>;
    }
}
