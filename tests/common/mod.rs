#![allow(dead_code, clippy::unwrap_used)]

use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tessera::{
    auth::{PasswordHasher, SessionLifecycleEngine, TokenCodec, UserService},
    pipeline::{Call, Payload, Pipeline},
    store::{MemoryIdentityRepository, MemorySessionStore},
};

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const EMAIL: &str = "a@b.com";
pub const PASSWORD: &str = "Str0ng!Pass";

pub fn engine_with_ttl(access: Duration, refresh: Duration) -> Arc<SessionLifecycleEngine> {
    let tokens = TokenCodec::new(&SecretString::from(SECRET), access, refresh).unwrap();
    let users = UserService::new(
        Arc::new(MemoryIdentityRepository::default()),
        PasswordHasher::with_params(1024, 1, 1).unwrap(),
    );
    Arc::new(SessionLifecycleEngine::new(
        Arc::new(MemorySessionStore::default()),
        users,
        tokens,
        refresh * 2,
    ))
}

pub fn engine() -> Arc<SessionLifecycleEngine> {
    engine_with_ttl(Duration::from_secs(900), Duration::from_secs(3600))
}

pub fn pipeline(engine: Arc<SessionLifecycleEngine>) -> Pipeline {
    Pipeline::standard(engine, Duration::from_secs(5)).unwrap()
}

pub fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

pub fn call(payload: Payload) -> Call {
    Call::new(payload, HeaderMap::new())
}

pub fn authed(payload: Payload, access_token: &str) -> Call {
    Call::new(payload, bearer(access_token))
}
