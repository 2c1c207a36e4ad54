#[cfg(test)]
mod tests {
    use crate::db::{
        authenticate_admin, authenticate_user, edit_client, ensure_seed_staff,
        find_client, find_proposal, find_staff, list_proposals, list_staff, register_client,
        register_proposal, register_staff, register_user, set_staff_email,
    };
    use crate::error::AppError;
    use crate::models::{NewProposal, Registration, SEED_STAFF};
    use crate::test::test_db::{STANDARD_PASSWORD, TestDbBuilder, count_rows, empty_pool};
    use crate::validation::ClientForm;
    use chrono::NaiveDate;

    fn client_form(tax_id: &str, name: &str) -> ClientForm {
        ClientForm {
            tax_id: tax_id.to_string(),
            requester_name: name.to_string(),
            phone: "21 99999-0000".to_string(),
            email: "contact@acme.com".to_string(),
        }
    }

    fn proposal_for(client_id: i64) -> NewProposal {
        NewProposal {
            client_id,
            environmental_authority: "CETESB".to_string(),
            process_type: "LI".to_string(),
            validity: "2024-06-30".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_client_is_idempotent_on_tax_id() {
        let pool = empty_pool().await;

        let first = register_client(&pool, client_form("12.345.678/0001-90", "Acme"))
            .await
            .expect("Failed to register client");
        let second = register_client(&pool, client_form("12.345.678/0001-90", "Other Name"))
            .await
            .expect("Failed to register client again");

        assert!(first.was_created());
        assert_eq!(second, Registration::Existing(first.id()));
        assert_eq!(count_rows(&pool, "clients").await, 1);

        let stored = find_client(&pool, first.id()).await.unwrap();
        assert_eq!(stored.requester_name, "Acme");
    }

    #[tokio::test]
    async fn test_register_client_rejects_invalid_form() {
        let pool = empty_pool().await;

        let mut form = client_form("", "Acme");
        form.email = "not-an-email".to_string();

        let result = register_client(&pool, form).await;
        match result {
            Err(AppError::Validation(msg)) => {
                assert!(msg.contains("tax_id"));
                assert!(msg.contains("email"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
        assert_eq!(count_rows(&pool, "clients").await, 0);
    }

    #[tokio::test]
    async fn test_register_client_trims_fields() {
        let pool = empty_pool().await;

        let first = register_client(&pool, client_form(" 111 ", "  Acme "))
            .await
            .expect("Failed to register client");
        let second = register_client(&pool, client_form("111", "Acme"))
            .await
            .expect("Failed to register client again");

        assert_eq!(second, Registration::Existing(first.id()));
        let stored = find_client(&pool, first.id()).await.unwrap();
        assert_eq!(stored.tax_id, "111");
        assert_eq!(stored.requester_name, "Acme");

        let blank_name = register_client(&pool, client_form("222", "   ")).await;
        assert!(matches!(blank_name, Err(AppError::Validation(_))));
        assert_eq!(count_rows(&pool, "clients").await, 1);
    }

    #[tokio::test]
    async fn test_edit_client_overwrites_one_field() {
        let test_db = TestDbBuilder::new().client("111").build().await.unwrap();
        let client_id = test_db.client_id("111").unwrap();

        let updated = edit_client(&test_db.pool, client_id, "phone", "21 1234-5678")
            .await
            .expect("Failed to edit client");

        assert_eq!(updated.phone, "21 1234-5678");
        let stored = find_client(&test_db.pool, client_id).await.unwrap();
        assert_eq!(stored, updated);
        assert_eq!(stored.requester_name, "Client 111");
    }

    #[tokio::test]
    async fn test_edit_client_rejects_unknown_field() {
        let test_db = TestDbBuilder::new().client("111").build().await.unwrap();
        let client_id = test_db.client_id("111").unwrap();

        let result = edit_client(&test_db.pool, client_id, "address", "Rua A").await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = edit_client(&test_db.pool, 999, "phone", "123").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_edit_client_tax_id_collision_is_conflict() {
        let test_db = TestDbBuilder::new()
            .client("111")
            .client("222")
            .build()
            .await
            .unwrap();
        let client_id = test_db.client_id("222").unwrap();

        let result = edit_client(&test_db.pool, client_id, "tax_id", "111").await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let stored = find_client(&test_db.pool, client_id).await.unwrap();
        assert_eq!(stored.tax_id, "222");
    }

    #[tokio::test]
    async fn test_register_staff_is_idempotent_on_name() {
        let pool = empty_pool().await;

        let first = register_staff(&pool, "Mateus", Some("mateus@example.com"))
            .await
            .unwrap();
        let second = register_staff(&pool, "Mateus", None).await.unwrap();

        assert_eq!(first.id(), second.id());
        assert!(!second.was_created());
        assert_eq!(list_staff(&pool).await.unwrap().len(), 1);

        let stored = find_staff(&pool, first.id()).await.unwrap();
        assert_eq!(stored.email.as_deref(), Some("mateus@example.com"));
    }

    #[tokio::test]
    async fn test_seed_staff_runs_once() {
        let pool = empty_pool().await;

        let created = ensure_seed_staff(&pool).await.unwrap();
        let again = ensure_seed_staff(&pool).await.unwrap();

        assert_eq!(created, SEED_STAFF.len());
        assert_eq!(again, 0);

        let names: Vec<String> = list_staff(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, SEED_STAFF.to_vec());
    }

    #[tokio::test]
    async fn test_set_staff_email() {
        let test_db = TestDbBuilder::new()
            .staff("Raul", None)
            .build()
            .await
            .unwrap();
        let staff_id = test_db.staff_id("Raul").unwrap();

        set_staff_email(&test_db.pool, staff_id, "raul@example.com")
            .await
            .expect("Failed to set email");
        let stored = find_staff(&test_db.pool, staff_id).await.unwrap();
        assert_eq!(stored.email.as_deref(), Some("raul@example.com"));

        let invalid = set_staff_email(&test_db.pool, staff_id, "raul").await;
        assert!(matches!(invalid, Err(AppError::Validation(_))));

        let missing = set_staff_email(&test_db.pool, 999, "x@example.com").await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_register_proposal_requires_existing_client() {
        let pool = empty_pool().await;

        let result = register_proposal(&pool, proposal_for(42)).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(list_proposals(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_proposal_requires_existing_staff() {
        let test_db = TestDbBuilder::new().client("111").build().await.unwrap();
        let input = NewProposal {
            responsible_id: Some(77),
            ..proposal_for(test_db.client_id("111").unwrap())
        };

        let result = register_proposal(&test_db.pool, input).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(test_db.count("proposals").await, 0);
    }

    #[tokio::test]
    async fn test_document_number_only_stored_for_renewals() {
        let test_db = TestDbBuilder::new().client("111").build().await.unwrap();
        let client_id = test_db.client_id("111").unwrap();

        let fresh = register_proposal(
            &test_db.pool,
            NewProposal {
                renewal: false,
                document_number: Some("LO-2020-001".to_string()),
                ..proposal_for(client_id)
            },
        )
        .await
        .unwrap();
        let renewal = register_proposal(
            &test_db.pool,
            NewProposal {
                renewal: true,
                document_number: Some("LO-2020-001".to_string()),
                ..proposal_for(client_id)
            },
        )
        .await
        .unwrap();

        let fresh = find_proposal(&test_db.pool, fresh).await.unwrap();
        let renewal = find_proposal(&test_db.pool, renewal).await.unwrap();
        assert_eq!(fresh.document_number, None);
        assert_eq!(renewal.document_number.as_deref(), Some("LO-2020-001"));
    }

    #[tokio::test]
    async fn test_register_proposal_round_trips_fields() {
        let test_db = TestDbBuilder::new()
            .client("111")
            .staff("Isabel", Some("isabel@example.com"))
            .build()
            .await
            .unwrap();

        let id = register_proposal(
            &test_db.pool,
            NewProposal {
                monthly: true,
                responsible_id: test_db.staff_id("Isabel"),
                work_type: Some("site survey".to_string()),
                meeting_at: Some("2024-01-02 09:30".to_string()),
                delivery_deadline: Some("2024-01-03 12:00".to_string()),
                notes: Some("bring the plans".to_string()),
                ..proposal_for(test_db.client_id("111").unwrap())
            },
        )
        .await
        .unwrap();

        let stored = find_proposal(&test_db.pool, id).await.unwrap();
        assert_eq!(stored.validity, NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
        assert!(stored.monthly);
        assert_eq!(stored.responsible_id, test_db.staff_id("Isabel"));
        assert_eq!(
            stored.meeting_at,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, 30, 0)
        );
        assert_eq!(
            stored.delivery_deadline,
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap().and_hms_opt(12, 0, 0)
        );
        assert_eq!(stored.notes.as_deref(), Some("bring the plans"));
    }

    #[tokio::test]
    async fn test_malformed_date_writes_nothing() {
        let test_db = TestDbBuilder::new().client("111").build().await.unwrap();

        let result = register_proposal(
            &test_db.pool,
            NewProposal {
                delivery_deadline: Some("03/01/2024 12:00".to_string()),
                ..proposal_for(test_db.client_id("111").unwrap())
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(test_db.count("proposals").await, 0);
    }

    #[tokio::test]
    async fn test_user_authentication() {
        let pool = empty_pool().await;

        let user_id = register_user(&pool, "alice", "secret", false)
            .await
            .expect("Failed to register user");

        let digest: String = sqlx::query_scalar("SELECT hashed_password FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_ne!(digest, "secret");

        let user = authenticate_user(&pool, "alice", "secret")
            .await
            .expect("Authentication should succeed");
        assert_eq!(user.id, user_id);
        assert_eq!(user.username, "alice");

        let wrong = authenticate_user(&pool, "alice", "wrong").await;
        let unknown = authenticate_user(&pool, "bob", "secret").await;
        match (wrong, unknown) {
            (Err(AppError::Authentication(a)), Err(AppError::Authentication(b))) => {
                assert_eq!(a, b, "Failures must not reveal which part was wrong");
            }
            other => panic!("Expected authentication errors, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_admin_entry_point_filters_non_admins() {
        let test_db = TestDbBuilder::new()
            .user("carol")
            .admin("root")
            .build()
            .await
            .unwrap();

        let non_admin = authenticate_admin(&test_db.pool, "carol", STANDARD_PASSWORD).await;
        assert!(matches!(non_admin, Err(AppError::Authentication(_))));

        let admin = authenticate_admin(&test_db.pool, "root", STANDARD_PASSWORD)
            .await
            .expect("Admin should authenticate");
        assert!(admin.is_admin);
        assert_eq!(Some(admin.id), test_db.user_id("root"));
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let test_db = TestDbBuilder::new().user("carol").build().await.unwrap();

        let result = register_user(&test_db.pool, "carol", "another", true).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(test_db.count("users").await, 1);
    }
}
