/// Default realm role Keycloak grants every user able to obtain permissions.
pub const ROLE_UMA_AUTHORIZATION: &str = "uma_authorization";
pub const ROLE_ADMIN: &str = "admin";
