use async_graphql::{EmptySubscription, Schema};
use axum::{Extension, Json};

use crate::graphql::mutation::Mutation;
use crate::graphql::query::Query;
use crate::middleware::RequestIdentity;
use crate::state::AppState;

pub type AcademySchema = Schema<Query, Mutation, EmptySubscription>;

pub fn create_schema(state: AppState) -> AcademySchema {
    Schema::build(Query, Mutation, EmptySubscription)
        .data(state)
        .finish()
}

pub async fn graphql_handler(
    Extension(schema): Extension<AcademySchema>,
    Extension(RequestIdentity(identity)): Extension<RequestIdentity>,
    Json(request): Json<async_graphql::Request>,
) -> Json<async_graphql::Response> {
    let request = match identity {
        Some(identity) => request.data(identity),
        None => request,
    };

    Json(schema.execute(request).await)
}
