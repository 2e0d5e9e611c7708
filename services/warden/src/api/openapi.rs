//! OpenAPI document for the warden HTTP API.
use crate::api::{
    permissions, system,
    types::{ErrorResponse, HealthStatus, Permission, PermissionRule},
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "warden",
        version = "v1",
        description = "Access-control policy administration API"
    ),
    paths(
        system::system_health,
        permissions::create_permission,
        permissions::list_permissions,
        permissions::get_permission,
        permissions::update_permission,
        permissions::delete_permission
    ),
    components(schemas(Permission, PermissionRule, HealthStatus, ErrorResponse)),
    tags(
        (name = "system", description = "Health endpoints"),
        (name = "permissions", description = "Policy rule management, relative to the configured api_route")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_permission_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        assert!(paths.contains(&"/permissions".to_string()));
        assert!(paths.contains(&"/permissions/{id}".to_string()));
        assert!(paths.contains(&"/system/health".to_string()));
    }
}
