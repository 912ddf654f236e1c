//! resonance-core: time-fingerprint and pillar matching, composite scoring,
//! grid-searched weight tuning and engine-specific leaderboards.

pub mod cancel;
pub mod composite;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod leaderboard;
pub mod matcher;
pub mod pillar;
pub mod pillar_matcher;
pub mod population;
pub mod rng;
pub mod source;
pub mod store;
pub mod time_matcher;
pub mod types;
pub mod weight_tuner;
