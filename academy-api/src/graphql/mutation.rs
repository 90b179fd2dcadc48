use async_graphql::{Context, Object, ID};
use academy_order::CheckoutRequest;

use crate::graphql::types::{EnrollInput, EnrollmentReceipt, Student, StudentInput};
use crate::graphql::{identity, parse_id, state, GqlResultExt};

pub struct Mutation;

#[Object]
impl Mutation {
    async fn add_student(&self, ctx: &Context<'_>, input: StudentInput) -> async_graphql::Result<Student> {
        let state = state(ctx)?;
        let student = state.accounts.add_student(identity(ctx), input.into()).await.gql()?;
        Ok(Student::owned(student))
    }

    async fn edit_student(&self, ctx: &Context<'_>, id: ID, input: StudentInput) -> async_graphql::Result<Student> {
        let state = state(ctx)?;
        let id = parse_id(&id).gql()?;
        let student = state
            .accounts
            .edit_student(identity(ctx), id, input.into())
            .await
            .gql()?;
        Ok(Student::owned(student))
    }

    async fn remove_student(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let state = state(ctx)?;
        let id = parse_id(&id).gql()?;
        state.accounts.remove_student(identity(ctx), id).await.gql()
    }

    /// Enroll one of the caller's children. Amount due is recorded for the
    /// payment step; credit and promotion are applied here.
    async fn enroll_class(&self, ctx: &Context<'_>, input: EnrollInput) -> async_graphql::Result<EnrollmentReceipt> {
        let state = state(ctx)?;
        let request = CheckoutRequest::try_from(input).gql()?;
        let receipt = state.checkout.enroll(identity(ctx), &request).await.gql()?;
        Ok(EnrollmentReceipt { inner: receipt })
    }
}
