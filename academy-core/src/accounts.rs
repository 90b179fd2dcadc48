use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use academy_shared::models::events::DomainEvent;

use crate::events::{publish_or_log, EventPublisher};
use crate::identity::{require, Identity};
use crate::models::{Student, StudentDetails, StudentInput};
use crate::repository::StudentRepository;
use crate::{CoreError, CoreResult};

/// Adds, edits and removes children under the caller's account.
#[derive(Clone)]
pub struct StudentService {
    students: Arc<dyn StudentRepository>,
    events: Arc<dyn EventPublisher>,
}

impl StudentService {
    pub fn new(students: Arc<dyn StudentRepository>, events: Arc<dyn EventPublisher>) -> Self {
        Self { students, events }
    }

    pub async fn add_student(&self, identity: Option<&Identity>, input: StudentInput) -> CoreResult<Student> {
        let identity = require(identity, "You must login first")?;

        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::field("Missing name", "child_name", "Name is required"));
        }

        let input = StudentInput { name, ..input };
        let created = self
            .students
            .create_student(identity.id, &input)
            .await
            .map_err(CoreError::internal)?;

        let Some(student) = created else {
            return Err(CoreError::field(
                "Duplicate name",
                "child_name",
                format!("{} is already on file", input.name),
            ));
        };

        info!(user_id = %identity.id, "student {} added", student.id);
        publish_or_log(self.events.as_ref(), DomainEvent::account_updated(student.parent_id)).await;
        Ok(student)
    }

    pub async fn edit_student(
        &self,
        identity: Option<&Identity>,
        id: Uuid,
        input: StudentInput,
    ) -> CoreResult<Student> {
        let identity = require(identity, "You must login first")?;

        let student = self
            .students
            .get_student(id)
            .await
            .map_err(CoreError::internal)?
            .ok_or_else(|| CoreError::NotFound(format!("student {}", id)))?;

        if student.parent_id != identity.id {
            return Err(CoreError::IdentityError("You can only edit your own child".to_string()));
        }

        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::field("Missing name", "child_name", "Name is required"));
        }

        let siblings = self
            .students
            .list_students(identity.id)
            .await
            .map_err(CoreError::internal)?;
        if siblings.iter().any(|s| s.id != id && s.name == name) {
            return Err(CoreError::field(
                "Duplicate name",
                "child_name",
                format!("{} is already on file", name),
            ));
        }
        let input = StudentInput { name, ..input };

        let details = StudentDetails {
            school: input.school.clone().or(student.details.school),
            ..student.details
        };

        let updated = self
            .students
            .update_student(id, &input, &details)
            .await
            .map_err(CoreError::internal)?;

        publish_or_log(self.events.as_ref(), DomainEvent::account_updated(updated.parent_id)).await;
        Ok(updated)
    }

    pub async fn remove_student(&self, identity: Option<&Identity>, id: Uuid) -> CoreResult<bool> {
        let identity = require(identity, "You must login first")?;

        let student = self.students.get_student(id).await.map_err(CoreError::internal)?;
        let student = match student {
            Some(s) if s.parent_id == identity.id => s,
            _ => return Err(CoreError::IdentityError("student not under your account".to_string())),
        };

        self.students
            .delete_student(student.id)
            .await
            .map_err(CoreError::internal)?;

        info!(user_id = %identity.id, "student {} removed", student.id);
        publish_or_log(self.events.as_ref(), DomainEvent::account_updated(student.parent_id)).await;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Project;
    use academy_shared::Masked;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStudents {
        rows: Mutex<Vec<Student>>,
    }

    #[async_trait]
    impl StudentRepository for MemoryStudents {
        async fn get_student(&self, id: Uuid) -> Result<Option<Student>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.rows.lock().unwrap().iter().find(|s| s.id == id).cloned())
        }

        async fn list_students(&self, parent_id: Uuid) -> Result<Vec<Student>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.rows.lock().unwrap().iter().filter(|s| s.parent_id == parent_id).cloned().collect())
        }

        async fn create_student(
            &self,
            parent_id: Uuid,
            input: &StudentInput,
        ) -> Result<Option<Student>, Box<dyn std::error::Error + Send + Sync>> {
            let mut rows = self.rows.lock().unwrap();
            if rows.iter().any(|s| s.parent_id == parent_id && s.name == input.name) {
                return Ok(None);
            }
            let student = Student {
                id: Uuid::new_v4(),
                parent_id,
                name: input.name.clone(),
                year: input.year,
                gender: input.gender.clone(),
                details: StudentDetails {
                    school: input.school.clone(),
                    ..Default::default()
                },
                created_at: Utc::now(),
            };
            rows.push(student.clone());
            Ok(Some(student))
        }

        async fn update_student(
            &self,
            id: Uuid,
            input: &StudentInput,
            details: &StudentDetails,
        ) -> Result<Student, Box<dyn std::error::Error + Send + Sync>> {
            let mut rows = self.rows.lock().unwrap();
            let student = rows.iter_mut().find(|s| s.id == id).ok_or("missing")?;
            student.name = input.name.clone();
            student.year = input.year;
            student.gender = input.gender.clone();
            student.details = details.clone();
            Ok(student.clone())
        }

        async fn delete_student(&self, id: Uuid) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.rows.lock().unwrap().retain(|s| s.id != id);
            Ok(())
        }

        async fn list_projects(
            &self,
            _student_id: Uuid,
            _published_only: bool,
        ) -> Result<Vec<Project>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct RecordingEvents {
        sent: Mutex<Vec<DomainEvent>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingEvents {
        async fn publish(&self, event: &DomainEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.sent.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn parent() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: Masked("parent@example.com".to_string()),
            is_admin: false,
        }
    }

    fn input(name: &str) -> StudentInput {
        StudentInput {
            name: name.to_string(),
            year: Some(2014),
            gender: None,
            school: Some("Lincoln".to_string()),
        }
    }

    #[tokio::test]
    async fn test_add_requires_login() {
        let svc = StudentService::new(Arc::new(MemoryStudents::default()), Arc::new(RecordingEvents::default()));
        let err = svc.add_student(None, input("Ada")).await.unwrap_err();
        assert!(matches!(err, CoreError::IdentityError(_)));
    }

    #[tokio::test]
    async fn test_duplicate_name_is_field_error() {
        let events = Arc::new(RecordingEvents::default());
        let svc = StudentService::new(Arc::new(MemoryStudents::default()), events.clone());
        let me = parent();

        svc.add_student(Some(&me), input("Ada")).await.unwrap();
        let err = svc.add_student(Some(&me), input("  Ada ")).await.unwrap_err();

        match err {
            CoreError::ValidationError { message, fields } => {
                assert_eq!(message, "Duplicate name");
                assert_eq!(fields["child_name"], "Ada is already on file");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_only_own_child() {
        let svc = StudentService::new(Arc::new(MemoryStudents::default()), Arc::new(RecordingEvents::default()));
        let me = parent();
        let someone = parent();

        let kid = svc.add_student(Some(&me), input("Ada")).await.unwrap();
        let err = svc.edit_student(Some(&someone), kid.id, input("Eve")).await.unwrap_err();
        assert!(matches!(err, CoreError::IdentityError(_)));

        let edited = svc
            .edit_student(Some(&me), kid.id, StudentInput { school: None, ..input("Ada L") })
            .await
            .unwrap();
        assert_eq!(edited.name, "Ada L");
        // School kept when not supplied
        assert_eq!(edited.details.school.as_deref(), Some("Lincoln"));
    }

    #[tokio::test]
    async fn test_edit_trims_and_rejects_sibling_name() {
        let svc = StudentService::new(Arc::new(MemoryStudents::default()), Arc::new(RecordingEvents::default()));
        let me = parent();

        let ada = svc.add_student(Some(&me), input("Ada")).await.unwrap();
        svc.add_student(Some(&me), input("Grace")).await.unwrap();

        let renamed = svc.edit_student(Some(&me), ada.id, input("  Ada L ")).await.unwrap();
        assert_eq!(renamed.name, "Ada L");

        // Keeping its own name is fine
        assert!(svc.edit_student(Some(&me), ada.id, input("Ada L")).await.is_ok());

        match svc.edit_student(Some(&me), ada.id, input(" Grace")).await.unwrap_err() {
            CoreError::ValidationError { message, fields } => {
                assert_eq!(message, "Duplicate name");
                assert_eq!(fields["child_name"], "Grace is already on file");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remove_student() {
        let students = Arc::new(MemoryStudents::default());
        let svc = StudentService::new(students.clone(), Arc::new(RecordingEvents::default()));
        let me = parent();

        let kid = svc.add_student(Some(&me), input("Ada")).await.unwrap();
        assert!(svc.remove_student(Some(&parent()), kid.id).await.is_err());
        assert!(svc.remove_student(Some(&me), kid.id).await.unwrap());
        assert!(students.list_students(me.id).await.unwrap().is_empty());
    }
}
