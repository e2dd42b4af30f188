use actix_web::{dev::ServiceRequest, Error, HttpMessage};
use actix_web_httpauth::extractors::bearer::{BearerAuth, Config};
use actix_web_httpauth::extractors::AuthenticationError;
use actix_web_httpauth::middleware::HttpAuthentication;
use std::future::{ready, Ready};

pub fn create_auth_middleware() -> HttpAuthentication<
    BearerAuth,
    fn(ServiceRequest, BearerAuth) -> Ready<Result<ServiceRequest, (Error, ServiceRequest)>>,
> {
    HttpAuthentication::bearer(validator)
}

fn validator(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Ready<Result<ServiceRequest, (Error, ServiceRequest)>> {
    let token = credentials.token();

    if token.is_empty() {
        let config = Config::default();
        return ready(Err((AuthenticationError::from(config).into(), req)));
    }

    // Simplified bearer scheme: "valid_<organization>_user<id>".
    // In production this is a JWT carrying the same two claims.
    if token.starts_with("valid_") {
        let parts: Vec<&str> = token.split('_').collect();
        let organization_id = parts.get(1).unwrap_or(&"").to_string();
        let user_id = parts
            .get(2)
            .and_then(|s| s.strip_prefix("user"))
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);

        req.extensions_mut().insert(AuthInfo {
            user_id,
            organization_id,
        });

        ready(Ok(req))
    } else {
        let config = Config::default();
        ready(Err((AuthenticationError::from(config).into(), req)))
    }
}

#[derive(Clone, Debug)]
pub struct AuthInfo {
    pub user_id: i64,
    pub organization_id: String,
}

pub fn extract_auth(req: &actix_web::HttpRequest) -> Option<AuthInfo> {
    req.extensions().get::<AuthInfo>().cloned()
}
