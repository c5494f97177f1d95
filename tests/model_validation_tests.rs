use chrono::{Duration, NaiveDate};
use intern_logger::{
    models::{
        FeedbackRequest, InviteRequest, LogActivity, UserDashboardStats, ValidationError,
        WorkLogRequest,
    },
    session::Role,
};

// --- Test Utilities ---

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn request(date_worked: NaiveDate, hours_worked: f64) -> WorkLogRequest {
    WorkLogRequest {
        task_title: "Write migration".to_string(),
        description: "Added the feedback table".to_string(),
        date_worked,
        hours_worked,
    }
}

// --- Work Log Validation ---

#[test]
fn test_log_date_window_is_inclusive() {
    let today = day(2025, 6, 10);
    assert!(request(today, 1.0).validate(today).is_ok());
    assert!(request(today - Duration::days(7), 1.0).validate(today).is_ok());
    assert_eq!(
        request(today - Duration::days(8), 1.0).validate(today),
        Err(ValidationError::DateOutOfRange)
    );
    assert_eq!(
        request(today + Duration::days(1), 1.0).validate(today),
        Err(ValidationError::DateOutOfRange)
    );
}

#[test]
fn test_log_hours_minimum() {
    let today = day(2025, 6, 10);
    assert!(request(today, 1.0).validate(today).is_ok());
    assert_eq!(
        request(today, 0.99).validate(today),
        Err(ValidationError::HoursTooLow)
    );
    assert_eq!(
        request(today, f64::NAN).validate(today),
        Err(ValidationError::HoursTooLow)
    );
}

#[test]
fn test_log_text_fields_are_required() {
    let today = day(2025, 6, 10);
    let mut blank_title = request(today, 2.0);
    blank_title.task_title = "  ".to_string();
    assert_eq!(
        blank_title.validate(today),
        Err(ValidationError::MissingTaskTitle)
    );

    let mut blank_description = request(today, 2.0);
    blank_description.description = String::new();
    assert_eq!(
        blank_description.validate(today),
        Err(ValidationError::MissingDescription)
    );
}

#[test]
fn test_log_request_deserializes_iso_dates() {
    let parsed: WorkLogRequest = serde_json::from_str(
        r#"{"task_title":"T","description":"D","date_worked":"2025-06-02","hours_worked":3}"#,
    )
    .unwrap();
    assert_eq!(parsed.date_worked, day(2025, 6, 2));
    assert_eq!(parsed.hours_worked, 3.0);
}

// --- Other Payloads ---

#[test]
fn test_feedback_requires_text() {
    let blank = FeedbackRequest {
        feedback_text: "\n".to_string(),
    };
    assert_eq!(blank.validate(), Err(ValidationError::MissingFeedback));
}

#[test]
fn test_invite_email_shape() {
    let check = |email: &str| {
        InviteRequest {
            email: email.to_string(),
        }
        .validate()
    };
    assert!(check("mentor@example.com").is_ok());
    assert!(check("  mentor@example.com ").is_ok());
    assert_eq!(check("mentor"), Err(ValidationError::InvalidEmail));
    assert_eq!(check("@example.com"), Err(ValidationError::InvalidEmail));
    assert_eq!(check("mentor@localhost"), Err(ValidationError::InvalidEmail));
}

// --- Dashboard Aggregation ---

#[test]
fn test_dashboard_groups_activity_by_day() {
    let rows = vec![
        LogActivity {
            date_worked: day(2025, 6, 3),
            hours_worked: 2.0,
        },
        LogActivity {
            date_worked: day(2025, 6, 1),
            hours_worked: 1.0,
        },
        LogActivity {
            date_worked: day(2025, 6, 3),
            hours_worked: 4.0,
        },
    ];

    let stats = UserDashboardStats::from_activity(&rows);
    assert_eq!(stats.total_logs, 3);
    assert_eq!(stats.total_hours, 7.0);
    let days: Vec<(NaiveDate, i64)> = stats.activity.iter().map(|a| (a.date, a.count)).collect();
    assert_eq!(days, vec![(day(2025, 6, 1), 1), (day(2025, 6, 3), 2)]);
}

#[test]
fn test_dashboard_without_logs_is_empty() {
    assert_eq!(
        UserDashboardStats::from_activity(&[]),
        UserDashboardStats::default()
    );
}

// --- Role ---

#[test]
fn test_role_wire_format() {
    assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), r#""admin""#);
    assert_eq!(Role::from_claim("user"), Some(Role::User));
    assert_eq!(Role::from_claim("Admin"), None);
    assert_eq!(Role::User.home_path(), "/user/dashboard");
    assert_eq!(Role::Admin.to_string(), "admin");
}
