#[cfg(test)]
pub mod test_db {
    use crate::database::init_schema;
    use crate::db::{register_client, register_proposal, register_staff, register_user};
    use crate::error::AppError;
    use crate::models::NewProposal;
    use crate::notifier::{Mailer, Notification};
    use crate::validation::ClientForm;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::{HashMap, HashSet};
    use std::sync::{Mutex, Once};
    use tracing::log::LevelFilter;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    pub async fn empty_pool() -> Pool<Sqlite> {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .filter_level(LevelFilter::Debug)
                .is_test(true)
                .try_init();
        });

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        init_schema(&pool).await.expect("Failed to apply schema");
        pool
    }

    pub async fn count_rows(pool: &Pool<Sqlite>, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
            .expect("Failed to count rows")
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<(String, bool)>,
        clients: Vec<String>,
        staff: Vec<(String, Option<String>)>,
        proposals: Vec<TestProposal>,
    }

    pub struct TestProposal {
        pub tax_id: String,
        pub process_type: String,
        pub staff_name: Option<String>,
        pub delivery_deadline: Option<String>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn user(mut self, username: &str) -> Self {
            self.users.push((username.to_string(), false));
            self
        }

        pub fn admin(mut self, username: &str) -> Self {
            self.users.push((username.to_string(), true));
            self
        }

        /// Requester name is derived from the tax id: `Client <tax_id>`.
        pub fn client(mut self, tax_id: &str) -> Self {
            self.clients.push(tax_id.to_string());
            self
        }

        pub fn staff(mut self, name: &str, email: Option<&str>) -> Self {
            self.staff.push((name.to_string(), email.map(String::from)));
            self
        }

        pub fn proposal(
            mut self,
            tax_id: &str,
            process_type: &str,
            staff_name: Option<&str>,
            delivery_deadline: Option<&str>,
        ) -> Self {
            self.proposals.push(TestProposal {
                tax_id: tax_id.to_string(),
                process_type: process_type.to_string(),
                staff_name: staff_name.map(String::from),
                delivery_deadline: delivery_deadline.map(String::from),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            let pool = empty_pool().await;

            let mut user_id_map = HashMap::new();
            let mut client_id_map = HashMap::new();
            let mut staff_id_map = HashMap::new();
            let mut proposal_ids = Vec::new();

            for (username, is_admin) in &self.users {
                let id = register_user(&pool, username, STANDARD_PASSWORD, *is_admin).await?;
                user_id_map.insert(username.clone(), id);
            }

            for tax_id in &self.clients {
                let form = ClientForm {
                    tax_id: tax_id.clone(),
                    requester_name: format!("Client {}", tax_id),
                    phone: "21 5555-0000".to_string(),
                    email: format!("client{}@example.com", tax_id),
                };
                let registration = register_client(&pool, form).await?;
                client_id_map.insert(tax_id.clone(), registration.id());
            }

            for (name, email) in &self.staff {
                let registration = register_staff(&pool, name, email.as_deref()).await?;
                staff_id_map.insert(name.clone(), registration.id());
            }

            for proposal in &self.proposals {
                let client_id = client_id_map
                    .get(&proposal.tax_id)
                    .copied()
                    .ok_or_else(|| AppError::NotFound(proposal.tax_id.clone()))?;
                let responsible_id = match &proposal.staff_name {
                    Some(name) => Some(
                        staff_id_map
                            .get(name)
                            .copied()
                            .ok_or_else(|| AppError::NotFound(name.clone()))?,
                    ),
                    None => None,
                };

                let id = register_proposal(
                    &pool,
                    NewProposal {
                        client_id,
                        environmental_authority: "INEA".to_string(),
                        process_type: proposal.process_type.clone(),
                        validity: "2024-12-31".to_string(),
                        responsible_id,
                        delivery_deadline: proposal.delivery_deadline.clone(),
                        ..Default::default()
                    },
                )
                .await?;
                proposal_ids.push(id);
            }

            Ok(TestDb {
                pool,
                user_id_map,
                client_id_map,
                staff_id_map,
                proposal_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub client_id_map: HashMap<String, i64>,
        pub staff_id_map: HashMap<String, i64>,
        pub proposal_ids: Vec<i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn client_id(&self, tax_id: &str) -> Option<i64> {
            self.client_id_map.get(tax_id).copied()
        }

        pub fn staff_id(&self, name: &str) -> Option<i64> {
            self.staff_id_map.get(name).copied()
        }

        pub async fn count(&self, table: &str) -> i64 {
            count_rows(&self.pool, table).await
        }
    }

    /// Records every notification; addresses in `failing` get a transport
    /// error instead.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<Notification>>,
        pub failing: HashSet<String>,
    }

    impl RecordingMailer {
        pub fn failing_for(addresses: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing: addresses.iter().map(|a| a.to_string()).collect(),
            }
        }

        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Mailer for RecordingMailer {
        async fn send(&self, notification: &Notification) -> Result<(), AppError> {
            if self.failing.contains(&notification.to) {
                return Err(AppError::ExternalService(format!(
                    "Connection refused for {}",
                    notification.to
                )));
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }
}
