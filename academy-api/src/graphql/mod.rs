pub mod schema;
pub mod query;
pub mod mutation;
pub mod types;

pub use schema::{create_schema, graphql_handler, AcademySchema};

use async_graphql::{Context, ID};
use uuid::Uuid;
use academy_core::identity::Identity;

use crate::error::AppError;
use crate::state::AppState;

pub(crate) fn state<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a AppState> {
    ctx.data::<AppState>()
}

pub(crate) fn identity<'a>(ctx: &Context<'a>) -> Option<&'a Identity> {
    ctx.data_opt::<Identity>()
}

pub(crate) fn parse_id(id: &ID) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|_| AppError::ValidationError {
        message: format!("Invalid id {}", id.as_str()),
        fields: Default::default(),
    })
}

/// Converts domain errors into GraphQL errors carrying status and field
/// extensions.
pub(crate) trait GqlResultExt<T> {
    fn gql(self) -> async_graphql::Result<T>;
}

impl<T, E: Into<AppError>> GqlResultExt<T> for Result<T, E> {
    fn gql(self) -> async_graphql::Result<T> {
        self.map_err(|e| e.into().into_graphql())
    }
}
