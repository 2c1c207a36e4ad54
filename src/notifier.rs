//! Deadline reminders.
//!
//! [`scan_and_notify`] walks every proposal with a delivery deadline and, for
//! each one due within [`REMINDER_WINDOW_DAYS`], mails its responsible staff
//! member through a [`Mailer`]. There is no "already notified" marker, so a
//! proposal is reminded again on every scan while it stays in the window.

use chrono::{NaiveDateTime, TimeDelta};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::env::MailConfig;
use crate::error::AppError;

pub const REMINDER_WINDOW_DAYS: i64 = 3;

const SUBJECT: &str = "Delivery deadline approaching";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait Mailer {
    async fn send(&self, notification: &Notification) -> Result<(), AppError>;
}

pub struct SmtpMailer {
    from_address: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, AppError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from_address: config.from_address.clone(),
            transport: builder.build(),
        })
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, notification: &Notification) -> Result<(), AppError> {
        let email = Message::builder()
            .from(self.from_address.parse()?)
            .to(notification.to.parse()?)
            .subject(notification.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())?;

        self.transport.send(email).await?;

        info!(to = %notification.to, "Notification email sent");
        Ok(())
    }
}

/// Stand-in used when no SMTP host is configured. Every send fails, so the
/// scan still reports which reminders were due.
pub struct UnconfiguredMailer;

impl Mailer for UnconfiguredMailer {
    async fn send(&self, notification: &Notification) -> Result<(), AppError> {
        Err(AppError::ExternalService(format!(
            "SMTP is not configured; reminder to {} not delivered",
            notification.to
        )))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(sqlx::FromRow)]
struct DeadlineRow {
    id: i64,
    process_type: String,
    delivery_deadline: NaiveDateTime,
    requester_name: String,
    staff_name: Option<String>,
    staff_email: Option<String>,
}

pub fn is_due(deadline: NaiveDateTime, now: NaiveDateTime) -> bool {
    deadline - now <= TimeDelta::days(REMINDER_WINDOW_DAYS)
}

pub fn reminder_body(
    staff_name: &str,
    process_type: &str,
    requester_name: &str,
    deadline: NaiveDateTime,
) -> String {
    format!(
        "Hello {},\n\nThe delivery deadline for the '{}' proposal for client '{}' is approaching. \
         The deadline is {}.\n\nPlease make sure all required tasks are completed on time.\n\nThank you!",
        staff_name, process_type, requester_name, deadline
    )
}

#[instrument(skip(pool, mailer))]
pub async fn scan_and_notify<M: Mailer>(
    pool: &Pool<Sqlite>,
    mailer: &M,
    now: NaiveDateTime,
) -> Result<ScanReport, AppError> {
    info!("Scanning proposal deadlines");

    let rows = sqlx::query_as::<_, DeadlineRow>(
        "SELECT p.id, p.process_type, p.delivery_deadline, c.requester_name,
                s.name AS staff_name, s.email AS staff_email
         FROM proposals p
         JOIN clients c ON c.id = p.client_id
         LEFT JOIN staff s ON s.id = p.responsible_id
         WHERE p.delivery_deadline IS NOT NULL
         ORDER BY p.id",
    )
    .fetch_all(pool)
    .await?;

    let mut report = ScanReport::default();

    for row in rows.into_iter().filter(|r| is_due(r.delivery_deadline, now)) {
        report.due += 1;

        let Some(staff_name) = row.staff_name else {
            debug!(proposal_id = row.id, "No responsible staff member, skipping");
            report.skipped += 1;
            continue;
        };
        let Some(to) = row.staff_email else {
            warn!(proposal_id = row.id, staff = %staff_name, "Staff member has no email, skipping");
            report.skipped += 1;
            continue;
        };

        let notification = Notification {
            to,
            subject: SUBJECT.to_string(),
            body: reminder_body(
                &staff_name,
                &row.process_type,
                &row.requester_name,
                row.delivery_deadline,
            ),
        };

        match mailer.send(&notification).await {
            Ok(()) => report.sent += 1,
            Err(err) => {
                err.log_and_record(&format!("Reminder for proposal {}", row.id));
                report.failed += 1;
            }
        }
    }

    info!(
        due = report.due,
        sent = report.sent,
        failed = report.failed,
        skipped = report.skipped,
        "Deadline scan finished"
    );
    Ok(report)
}
