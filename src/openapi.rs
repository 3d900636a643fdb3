use utoipa::OpenApi;

use crate::models::{ClassSession, ClassType, Club};
use crate::refresh::{RefreshState, RefreshStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz_live,
        crate::handlers::healthcheck,
        crate::handlers::list_classes,
        crate::handlers::list_class_types,
        crate::handlers::list_clubs
    ),
    components(schemas(ClassSession, ClassType, Club, RefreshStatus, RefreshState)),
    tags(
        (name = "timetable", description = "Class timetable queries"),
        (name = "health", description = "Liveness and readiness probes")
    ),
)]
pub struct ApiDoc;
