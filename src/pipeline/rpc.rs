//! RPC method table and the request/reply message shapes.
//!
//! Request structs default every missing field to an empty string, so the
//! validation stage (not the decoder) reports absent fields.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Register,
    Login,
    Logout,
    RefreshToken,
    ValidateToken,
    Health,
    CreateUser,
    GetUserById,
    GetUserByEmail,
    UpdateUserPassword,
}

pub const AUTH_SERVICE: &str = "auth.AuthService";
pub const USER_SERVICE: &str = "user.UserService";

impl Method {
    pub const ALL: [Self; 10] = [
        Self::Register,
        Self::Login,
        Self::Logout,
        Self::RefreshToken,
        Self::ValidateToken,
        Self::Health,
        Self::CreateUser,
        Self::GetUserById,
        Self::GetUserByEmail,
        Self::UpdateUserPassword,
    ];

    #[must_use]
    pub const fn service(self) -> &'static str {
        match self {
            Self::CreateUser
            | Self::GetUserById
            | Self::GetUserByEmail
            | Self::UpdateUserPassword => USER_SERVICE,
            _ => AUTH_SERVICE,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Register => "Register",
            Self::Login => "Login",
            Self::Logout => "Logout",
            Self::RefreshToken => "RefreshToken",
            Self::ValidateToken => "ValidateToken",
            Self::Health => "Health",
            Self::CreateUser => "CreateUser",
            Self::GetUserById => "GetUserById",
            Self::GetUserByEmail => "GetUserByEmail",
            Self::UpdateUserPassword => "UpdateUserPassword",
        }
    }

    /// Fully qualified name, e.g. `/auth.AuthService/Login`.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Register => "/auth.AuthService/Register",
            Self::Login => "/auth.AuthService/Login",
            Self::Logout => "/auth.AuthService/Logout",
            Self::RefreshToken => "/auth.AuthService/RefreshToken",
            Self::ValidateToken => "/auth.AuthService/ValidateToken",
            Self::Health => "/auth.AuthService/Health",
            Self::CreateUser => "/user.UserService/CreateUser",
            Self::GetUserById => "/user.UserService/GetUserById",
            Self::GetUserByEmail => "/user.UserService/GetUserByEmail",
            Self::UpdateUserPassword => "/user.UserService/UpdateUserPassword",
        }
    }

    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.path() == path)
    }

    /// Methods reachable without a bearer token.
    #[must_use]
    pub const fn is_public(self) -> bool {
        matches!(self, Self::Register | Self::Login | Self::Health)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct LogoutRequest {
    pub access_token: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidateTokenRequest {
    pub token: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct HealthRequest {}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct GetUserByIdRequest {
    pub user_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct GetUserByEmailRequest {
    pub email: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateUserPasswordRequest {
    pub id: String,
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

/// A decoded request, one variant per [`Method`].
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Register(RegisterRequest),
    Login(LoginRequest),
    Logout(LogoutRequest),
    RefreshToken(RefreshTokenRequest),
    ValidateToken(ValidateTokenRequest),
    Health(HealthRequest),
    CreateUser(CreateUserRequest),
    GetUserById(GetUserByIdRequest),
    GetUserByEmail(GetUserByEmailRequest),
    UpdateUserPassword(UpdateUserPasswordRequest),
}

fn parse<T>(body: &[u8]) -> Result<T, serde_json::Error>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        Ok(T::default())
    } else {
        serde_json::from_slice(body)
    }
}

impl Payload {
    /// Decode a JSON body for `method`. An empty body is an all-default request.
    ///
    /// # Errors
    /// Returns the JSON error for bodies that are not a matching object.
    pub fn decode(method: Method, body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match method {
            Method::Register => Self::Register(parse(body)?),
            Method::Login => Self::Login(parse(body)?),
            Method::Logout => Self::Logout(parse(body)?),
            Method::RefreshToken => Self::RefreshToken(parse(body)?),
            Method::ValidateToken => Self::ValidateToken(parse(body)?),
            Method::Health => Self::Health(parse(body)?),
            Method::CreateUser => Self::CreateUser(parse(body)?),
            Method::GetUserById => Self::GetUserById(parse(body)?),
            Method::GetUserByEmail => Self::GetUserByEmail(parse(body)?),
            Method::UpdateUserPassword => Self::UpdateUserPassword(parse(body)?),
        })
    }

    #[must_use]
    pub const fn method(&self) -> Method {
        match self {
            Self::Register(_) => Method::Register,
            Self::Login(_) => Method::Login,
            Self::Logout(_) => Method::Logout,
            Self::RefreshToken(_) => Method::RefreshToken,
            Self::ValidateToken(_) => Method::ValidateToken,
            Self::Health(_) => Method::Health,
            Self::CreateUser(_) => Method::CreateUser,
            Self::GetUserById(_) => Method::GetUserById,
            Self::GetUserByEmail(_) => Method::GetUserByEmail,
            Self::UpdateUserPassword(_) => Method::UpdateUserPassword,
        }
    }

    /// Field value by its validation name (snake case).
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match (self, name) {
            (Self::Register(r), "email") => &r.email,
            (Self::Register(r), "password") => &r.password,
            (Self::Register(r), "password_confirm") => &r.password_confirm,
            (Self::Login(r), "email") => &r.email,
            (Self::Login(r), "password") => &r.password,
            (Self::Logout(r), "access_token") => &r.access_token,
            (Self::RefreshToken(r), "refresh_token") => &r.refresh_token,
            (Self::ValidateToken(r), "token") => &r.token,
            (Self::CreateUser(r), "email") => &r.email,
            (Self::CreateUser(r), "password") => &r.password,
            (Self::CreateUser(r), "password_confirm") => &r.password_confirm,
            (Self::GetUserById(r), "user_id") => &r.user_id,
            (Self::GetUserByEmail(r), "email") => &r.email,
            (Self::UpdateUserPassword(r), "id") => &r.id,
            (Self::UpdateUserPassword(r), "old_password") => &r.old_password,
            (Self::UpdateUserPassword(r), "new_password") => &r.new_password,
            (Self::UpdateUserPassword(r), "new_password_confirm") => &r.new_password_confirm,
            _ => return None,
        };
        Some(value.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenResponse {
    pub valid: bool,
    pub user_id: String,
    pub session_id: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub is_active: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub name: String,
    pub version: String,
    pub build: String,
    pub store: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Empty {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Tokens(TokenPair),
    Validation(ValidateTokenResponse),
    User(UserResponse),
    Health(HealthResponse),
    Empty(Empty),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn paths_round_trip() {
        for method in Method::ALL {
            assert_eq!(Method::from_path(method.path()), Some(method));
            assert_eq!(
                method.path(),
                format!("/{}/{}", method.service(), method.name())
            );
        }
        assert_eq!(Method::from_path("/auth.AuthService/Nope"), None);
    }

    #[test]
    fn public_methods() {
        let public: Vec<_> = Method::ALL.into_iter().filter(|m| m.is_public()).collect();
        assert_eq!(public, [Method::Register, Method::Login, Method::Health]);
    }

    #[test]
    fn missing_fields_decode_empty() {
        let payload = Payload::decode(Method::Register, br#"{"password":"x"}"#).unwrap();
        assert_eq!(payload.field("email"), Some(""));
        assert_eq!(payload.field("password"), Some("x"));
        assert_eq!(payload.field("password_confirm"), Some(""));

        let payload = Payload::decode(Method::Logout, b"").unwrap();
        assert_eq!(payload.field("access_token"), Some(""));
    }

    #[test]
    fn camel_case_on_the_wire() {
        let payload = Payload::decode(
            Method::UpdateUserPassword,
            br#"{"id":"1","oldPassword":"a","newPassword":"b","newPasswordConfirm":"c"}"#,
        )
        .unwrap();
        assert_eq!(payload.method(), Method::UpdateUserPassword);
        assert_eq!(payload.field("old_password"), Some("a"));
        assert_eq!(payload.field("new_password_confirm"), Some("c"));
        assert_eq!(payload.field("email"), None);
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(Payload::decode(Method::Login, b"[1,2]").is_err());
    }
}
