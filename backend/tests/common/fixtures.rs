//! Test fixtures and data factories for backend tests

#![allow(dead_code)]

/// Test user credentials
pub struct TestUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: &'static str,
}

impl TestUser {
    pub fn admin() -> Self {
        Self {
            username: "admin_user".to_string(),
            email: "admin@test.local".to_string(),
            password: "admin123!".to_string(),
            role: "ADMIN",
        }
    }

    pub fn regular() -> Self {
        Self::with_name("test_user")
    }

    pub fn with_name(name: &str) -> Self {
        Self {
            username: name.to_string(),
            email: format!("{}@test.local", name),
            password: "password123".to_string(),
            role: "USER",
        }
    }
}

/// Multipart upload payload
pub struct TestUpload {
    pub title: String,
    pub description: Option<String>,
    pub tag: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

impl TestUpload {
    pub fn report() -> Self {
        Self {
            title: "Quarterly report".to_string(),
            description: Some("Numbers for Q3".to_string()),
            tag: "finance".to_string(),
            file_name: "report.pdf".to_string(),
            content: b"%PDF-1.4 quarterly numbers".to_vec(),
        }
    }

    pub fn notes() -> Self {
        Self {
            title: "Meeting notes".to_string(),
            description: None,
            tag: "meetings".to_string(),
            file_name: "notes.txt".to_string(),
            content: b"agenda and action items".to_vec(),
        }
    }

    pub fn titled(title: &str, tag: &str) -> Self {
        Self {
            title: title.to_string(),
            tag: tag.to_string(),
            ..Self::notes()
        }
    }
}
