use super::handlers::{self, ErrorBody};
use crate::pipeline::rpc::{
    CreateUserRequest, Empty, GetUserByEmailRequest, GetUserByIdRequest, HealthResponse,
    LoginRequest, LogoutRequest, RefreshTokenRequest, RegisterRequest, TokenPair,
    UpdateUserPasswordRequest, UserResponse, ValidateTokenRequest, ValidateTokenResponse,
};
use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        Contact, InfoBuilder, License, Tag,
    },
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register,
        handlers::login,
        handlers::logout,
        handlers::refresh_token,
        handlers::validate_token,
        handlers::health_rpc,
        handlers::health,
        handlers::create_user,
        handlers::get_user_by_id,
        handlers::get_user_by_email,
        handlers::update_user_password,
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        LogoutRequest,
        RefreshTokenRequest,
        ValidateTokenRequest,
        CreateUserRequest,
        GetUserByIdRequest,
        GetUserByEmailRequest,
        UpdateUserPasswordRequest,
        TokenPair,
        ValidateTokenResponse,
        UserResponse,
        HealthResponse,
        Empty,
        ErrorBody,
    )),
    modifiers(&BearerAuth)
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// The served `OpenAPI` document, with info taken from Cargo metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();
    info.contact = cargo_contact();
    info.license = cargo_license();
    doc.info = info;

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Session and token lifecycle".to_string());
    let mut user_tag = Tag::new("user");
    user_tag.description = Some("User accounts".to_string());
    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Liveness and store checks".to_string());
    doc.tags = Some(vec![auth_tag, user_tag, health_tag]);

    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    fn non_empty(s: &str) -> Option<&str> {
        let s = s.trim();
        (!s.is_empty()).then_some(s)
    }
    match author.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (non_empty(author), None),
    }
}
