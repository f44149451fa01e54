#![allow(clippy::unwrap_used)]

mod common;

use async_trait::async_trait;
use common::{authed, call, EMAIL, PASSWORD};
use std::{sync::Arc, time::Duration};
use tessera::pipeline::{
    logging::Logging,
    recovery::{Recovery, INTERNAL_MESSAGE},
    rpc::{
        Empty, HealthRequest, LoginRequest, LogoutRequest, RefreshTokenRequest, RegisterRequest,
        TokenPair, UpdateUserPasswordRequest, ValidateTokenRequest,
    },
    Call, CallResult, Handler, Payload, Pipeline, Reply,
};
use tonic::Code;

fn register_payload(email: &str, password: &str, confirm: &str) -> Payload {
    Payload::Register(RegisterRequest {
        email: email.to_string(),
        password: password.to_string(),
        password_confirm: confirm.to_string(),
    })
}

async fn register(pipeline: &Pipeline) -> TokenPair {
    match pipeline
        .call(call(register_payload(EMAIL, PASSWORD, PASSWORD)))
        .await
        .unwrap()
    {
        Reply::Tokens(pair) => pair,
        other => panic!("unexpected reply: {other:?}"),
    }
}

async fn register_other(pipeline: &Pipeline) -> TokenPair {
    match pipeline
        .call(call(register_payload("c@d.com", PASSWORD, PASSWORD)))
        .await
        .unwrap()
    {
        Reply::Tokens(pair) => pair,
        other => panic!("unexpected reply: {other:?}"),
    }
}

fn refresh(token: &str) -> Call {
    call(Payload::RefreshToken(RefreshTokenRequest {
        refresh_token: token.to_string(),
    }))
}

#[tokio::test]
async fn validation_rejects_before_the_handler() {
    let pipeline = common::pipeline(common::engine());

    let status = pipeline
        .call(call(register_payload("", "x", "x")))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);
    assert!(status.message().contains("email is required"));
    assert!(status.message().contains("weak password"));
}

#[tokio::test]
async fn register_login_and_validate_over_the_pipeline() {
    let pipeline = common::pipeline(common::engine());
    let registered = register(&pipeline).await;
    assert!(!registered.access_token.is_empty());

    let login = pipeline
        .call(call(Payload::Login(LoginRequest {
            email: EMAIL.to_string(),
            password: PASSWORD.to_string(),
        })))
        .await
        .unwrap();
    let Reply::Tokens(login) = login else {
        panic!("expected tokens");
    };

    let reply = pipeline
        .call(authed(
            Payload::ValidateToken(ValidateTokenRequest {
                token: login.access_token.clone(),
            }),
            &login.access_token,
        ))
        .await
        .unwrap();
    let Reply::Validation(validation) = reply else {
        panic!("expected validation");
    };
    assert!(validation.valid);
    assert!(validation.error.is_empty());
    assert!(!validation.session_id.is_empty());
}

#[tokio::test]
async fn wrong_password_is_unauthenticated() {
    let pipeline = common::pipeline(common::engine());
    register(&pipeline).await;

    let status = pipeline
        .call(call(Payload::Login(LoginRequest {
            email: EMAIL.to_string(),
            password: "wrong".to_string(),
        })))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "invalid password");
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let pipeline = common::pipeline(common::engine());

    let status = pipeline
        .call(call(Payload::Login(LoginRequest {
            email: "nobody@b.com".to_string(),
            password: PASSWORD.to_string(),
        })))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::NotFound);
    assert_eq!(status.message(), "user not found");
}

#[tokio::test]
async fn duplicate_registration_is_already_exists() {
    let pipeline = common::pipeline(common::engine());
    register(&pipeline).await;

    let status = pipeline
        .call(call(register_payload(EMAIL, PASSWORD, PASSWORD)))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::AlreadyExists);
}

#[tokio::test]
async fn protected_methods_need_a_bearer_token() {
    let pipeline = common::pipeline(common::engine());

    let status = pipeline
        .call(call(Payload::ValidateToken(ValidateTokenRequest {
            token: "anything".to_string(),
        })))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "authentication failed");

    let status = pipeline
        .call(call(Payload::RefreshToken(RefreshTokenRequest {
            refresh_token: "anything".to_string(),
        })))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "authentication failed");
}

#[tokio::test]
async fn validate_reports_on_the_body_token() {
    let engine = common::engine_with_ttl(Duration::from_secs(1), Duration::from_secs(3));
    let pipeline = common::pipeline(engine);
    let caller = register(&pipeline).await;
    let other = register_other(&pipeline).await;

    let validate = |token: &str, bearer: &str| {
        authed(
            Payload::ValidateToken(ValidateTokenRequest {
                token: token.to_string(),
            }),
            bearer,
        )
    };

    // a bad body token is a negative answer, not a failed call
    let Reply::Validation(garbage) = pipeline
        .call(validate("not-a-jwt", &caller.access_token))
        .await
        .unwrap()
    else {
        panic!("expected validation");
    };
    assert!(!garbage.valid);
    assert!(!garbage.error.is_empty());
    assert!(garbage.user_id.is_empty());

    // a refresh token is not an access token
    let Reply::Validation(wrong_kind) = pipeline
        .call(validate(&other.refresh_token, &caller.access_token))
        .await
        .unwrap()
    else {
        panic!("expected validation");
    };
    assert!(!wrong_kind.valid);
    assert_eq!(wrong_kind.error, "invalid access token");

    tokio::time::sleep(Duration::from_millis(1200)).await;

    // the caller's own credential has to be live
    let status = pipeline
        .call(validate(&other.access_token, &caller.access_token))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn health_is_public() {
    let pipeline = common::pipeline(common::engine());

    let reply = pipeline
        .call(call(Payload::Health(HealthRequest {})))
        .await
        .unwrap();
    let Reply::Health(health) = reply else {
        panic!("expected health");
    };
    assert_eq!(health.name, "tessera");
    assert_eq!(health.store, "ok");
}

#[tokio::test]
async fn refresh_rotates_over_the_pipeline() {
    let pipeline = common::pipeline(common::engine());
    let pair = register(&pipeline).await;

    let Reply::Tokens(rotated) = pipeline
        .call(refresh(&pair.refresh_token))
        .await
        .unwrap()
    else {
        panic!("expected tokens");
    };
    assert_ne!(rotated.refresh_token, pair.refresh_token);

    // the replayed refresh token no longer matches the stored one
    let status = pipeline
        .call(refresh(&pair.refresh_token))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    let status = pipeline
        .call(authed(
            Payload::ValidateToken(ValidateTokenRequest {
                token: rotated.access_token.clone(),
            }),
            &pair.access_token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn refresh_after_access_expiry() {
    let engine = common::engine_with_ttl(Duration::from_secs(1), Duration::from_secs(3));
    let pipeline = common::pipeline(engine);
    let pair = register(&pipeline).await;

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let status = pipeline
        .call(authed(
            Payload::ValidateToken(ValidateTokenRequest {
                token: pair.access_token.clone(),
            }),
            &pair.access_token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    // no bearer: the refresh token authenticates itself
    let Reply::Tokens(rotated) = pipeline
        .call(refresh(&pair.refresh_token))
        .await
        .unwrap()
    else {
        panic!("expected tokens");
    };
    assert_ne!(rotated.access_token, pair.access_token);

    let Reply::Validation(validation) = pipeline
        .call(authed(
            Payload::ValidateToken(ValidateTokenRequest {
                token: rotated.access_token.clone(),
            }),
            &rotated.access_token,
        ))
        .await
        .unwrap()
    else {
        panic!("expected validation");
    };
    assert!(validation.valid);

    let status = pipeline
        .call(refresh(&pair.refresh_token))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let pipeline = common::pipeline(common::engine());
    let pair = register(&pipeline).await;

    let logout = || {
        authed(
            Payload::Logout(LogoutRequest {
                access_token: pair.access_token.clone(),
            }),
            &pair.access_token,
        )
    };

    let reply = pipeline.call(logout()).await.unwrap();
    assert_eq!(reply, Reply::Empty(Empty {}));

    let status = pipeline.call(logout()).await.unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn logout_of_another_session_is_denied() {
    let pipeline = common::pipeline(common::engine());
    let first = register(&pipeline).await;
    let Reply::Tokens(second) = pipeline
        .call(call(Payload::Login(LoginRequest {
            email: EMAIL.to_string(),
            password: PASSWORD.to_string(),
        })))
        .await
        .unwrap()
    else {
        panic!("expected tokens");
    };

    let status = pipeline
        .call(authed(
            Payload::Logout(LogoutRequest {
                access_token: first.access_token.clone(),
            }),
            &second.access_token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);
}

#[tokio::test]
async fn password_update_is_self_only() {
    let pipeline = common::pipeline(common::engine());
    let pair = register(&pipeline).await;

    let status = pipeline
        .call(authed(
            Payload::UpdateUserPassword(UpdateUserPasswordRequest {
                id: uuid::Uuid::new_v4().to_string(),
                old_password: PASSWORD.to_string(),
                new_password: "N3w!Passw0rd".to_string(),
                new_password_confirm: "N3w!Passw0rd".to_string(),
            }),
            &pair.access_token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);
}

struct Panicking;

#[async_trait]
impl Handler for Panicking {
    async fn handle(&self, _call: Call) -> CallResult {
        panic!("handler exploded with a secret detail");
    }
}

#[tokio::test]
async fn panics_become_internal_errors() {
    let pipeline = Pipeline::new(Arc::new(Panicking))
        .with(Logging)
        .with(Recovery::new());

    let status = pipeline
        .call(call(Payload::Health(HealthRequest {})))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Internal);
    assert_eq!(status.message(), INTERNAL_MESSAGE);
    assert!(!status.message().contains("secret detail"));

    // the pipeline keeps serving after a panic
    let status = pipeline
        .call(call(Payload::Health(HealthRequest {})))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
}

struct Slow;

#[async_trait]
impl Handler for Slow {
    async fn handle(&self, _call: Call) -> CallResult {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Reply::Empty(Empty {}))
    }
}

#[tokio::test]
async fn interceptors_run_in_order() {
    let pipeline = Pipeline::new(Arc::new(Slow))
        .with(tessera::pipeline::validation::Validation::new().unwrap());

    // validation answers first, so the slow handler is never reached
    let status = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.call(call(register_payload("", "", ""))),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn slow_calls_hit_the_deadline() {
    use secrecy::SecretString;
    use tessera::{
        auth::{PasswordHasher, SessionLifecycleEngine, TokenCodec, UserService},
        pipeline::dispatch::{Dispatcher, DEADLINE_MESSAGE},
        store::{MemoryIdentityRepository, MemorySessionStore},
    };

    // production Argon2 cost takes far longer than the deadline
    let engine = Arc::new(SessionLifecycleEngine::new(
        Arc::new(MemorySessionStore::default()),
        UserService::new(
            Arc::new(MemoryIdentityRepository::default()),
            PasswordHasher::new().unwrap(),
        ),
        TokenCodec::new(
            &SecretString::from(common::SECRET),
            Duration::from_secs(900),
            Duration::from_secs(3600),
        )
        .unwrap(),
        Duration::from_secs(7200),
    ));
    let pipeline = Pipeline::new(Arc::new(Dispatcher::new(engine, Duration::from_millis(1))));

    let status = pipeline
        .call(call(register_payload(EMAIL, PASSWORD, PASSWORD)))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::DeadlineExceeded);
    assert_eq!(status.message(), DEADLINE_MESSAGE);
}
