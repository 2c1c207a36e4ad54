use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::auth::{DbUser, User, hash_password};
use crate::error::AppError;
use crate::models::{
    Client, ClientField, NewProposal, Proposal, ProposalDraft, Registration, SEED_STAFF, Staff,
};
use crate::validation::{ClientForm, StaffEmailForm, UserForm, ValidateExt};

#[instrument(skip(pool), fields(tax_id = %form.tax_id))]
pub async fn register_client(
    pool: &Pool<Sqlite>,
    form: ClientForm,
) -> Result<Registration, AppError> {
    let form = form.trimmed().validated()?;
    let mut tx = pool.begin().await?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM clients WHERE tax_id = ?")
        .bind(&form.tax_id)
        .fetch_optional(&mut *tx)
        .await?;

    if let Some(id) = existing {
        info!(client_id = id, "Client already registered");
        return Ok(Registration::Existing(id));
    }

    let res = sqlx::query(
        "INSERT INTO clients (tax_id, requester_name, phone, email) VALUES (?, ?, ?, ?)",
    )
    .bind(&form.tax_id)
    .bind(&form.requester_name)
    .bind(&form.phone)
    .bind(&form.email)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_insert(e, "Client"))?;

    tx.commit().await?;

    let id = res.last_insert_rowid();
    info!(client_id = id, requester_name = %form.requester_name, "Client registered");
    Ok(Registration::Created(id))
}

#[instrument(skip(pool))]
pub async fn find_client(pool: &Pool<Sqlite>, id: i64) -> Result<Client, AppError> {
    let row = sqlx::query_as::<_, Client>(
        "SELECT id, tax_id, requester_name, phone, email FROM clients WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| AppError::NotFound(format!("Client with id {} not found", id)))
}

/// Overwrites a single client field, named as typed by the user.
#[instrument(skip(pool, value))]
pub async fn edit_client(
    pool: &Pool<Sqlite>,
    client_id: i64,
    field_name: &str,
    value: &str,
) -> Result<Client, AppError> {
    let field: ClientField = field_name.parse()?;

    let mut tx = pool.begin().await?;
    let mut client = sqlx::query_as::<_, Client>(
        "SELECT id, tax_id, requester_name, phone, email FROM clients WHERE id = ?",
    )
    .bind(client_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Client with id {} not found", client_id)))?;

    client.apply_edit(field, value);
    client.to_form().validated()?;

    sqlx::query(
        "UPDATE clients SET tax_id = ?, requester_name = ?, phone = ?, email = ? WHERE id = ?",
    )
    .bind(&client.tax_id)
    .bind(&client.requester_name)
    .bind(&client.phone)
    .bind(&client.email)
    .bind(client.id)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_insert(e, "Client tax identifier"))?;

    tx.commit().await?;

    info!(client_id, field = %field, "Client updated");
    Ok(client)
}

#[instrument(skip(pool, input), fields(client_id = input.client_id))]
pub async fn register_proposal(pool: &Pool<Sqlite>, input: NewProposal) -> Result<i64, AppError> {
    if !input.renewal && input.document_number.is_some() {
        debug!("Discarding document number on a non-renewal proposal");
    }
    let draft = ProposalDraft::try_from(input)?;

    let mut tx = pool.begin().await?;

    let client: Option<i64> = sqlx::query_scalar("SELECT id FROM clients WHERE id = ?")
        .bind(draft.client_id)
        .fetch_optional(&mut *tx)
        .await?;
    if client.is_none() {
        return Err(AppError::NotFound(format!(
            "Client with id {} not found",
            draft.client_id
        )));
    }

    if let Some(staff_id) = draft.responsible_id {
        let staff: Option<i64> = sqlx::query_scalar("SELECT id FROM staff WHERE id = ?")
            .bind(staff_id)
            .fetch_optional(&mut *tx)
            .await?;
        if staff.is_none() {
            return Err(AppError::NotFound(format!(
                "Staff member with id {} not found",
                staff_id
            )));
        }
    }

    let res = sqlx::query(
        "INSERT INTO proposals
         (client_id, environmental_authority, process_type, renewal, document_number, validity,
          monthly, responsible_id, work_type, meeting_at, delivery_deadline, notes)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(draft.client_id)
    .bind(&draft.environmental_authority)
    .bind(&draft.process_type)
    .bind(draft.renewal)
    .bind(&draft.document_number)
    .bind(draft.validity)
    .bind(draft.monthly)
    .bind(draft.responsible_id)
    .bind(&draft.work_type)
    .bind(draft.meeting_at)
    .bind(draft.delivery_deadline)
    .bind(&draft.notes)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let id = res.last_insert_rowid();
    info!(proposal_id = id, process_type = %draft.process_type, "Proposal registered");
    Ok(id)
}

const PROPOSAL_COLUMNS: &str = "id, client_id, environmental_authority, process_type, renewal,
     document_number, validity, monthly, responsible_id, work_type, meeting_at,
     delivery_deadline, notes";

#[instrument(skip(pool))]
pub async fn find_proposal(pool: &Pool<Sqlite>, id: i64) -> Result<Proposal, AppError> {
    let query = format!("SELECT {} FROM proposals WHERE id = ?", PROPOSAL_COLUMNS);
    let row = sqlx::query_as::<_, Proposal>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.ok_or_else(|| AppError::NotFound(format!("Proposal with id {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn list_proposals(pool: &Pool<Sqlite>) -> Result<Vec<Proposal>, AppError> {
    let query = format!("SELECT {} FROM proposals ORDER BY id", PROPOSAL_COLUMNS);
    Ok(sqlx::query_as::<_, Proposal>(&query).fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn register_staff(
    pool: &Pool<Sqlite>,
    name: &str,
    email: Option<&str>,
) -> Result<Registration, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Staff name is required".to_string()));
    }
    if let Some(email) = email {
        StaffEmailForm {
            email: email.to_string(),
        }
        .validated()?;
    }

    let mut tx = pool.begin().await?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM staff WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;

    if let Some(id) = existing {
        info!(staff_id = id, "Staff member already registered");
        return Ok(Registration::Existing(id));
    }

    let res = sqlx::query("INSERT INTO staff (name, email) VALUES (?, ?)")
        .bind(name)
        .bind(email)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_insert(e, "Staff member"))?;

    tx.commit().await?;

    let id = res.last_insert_rowid();
    info!(staff_id = id, "Staff member registered");
    Ok(Registration::Created(id))
}

/// Registers every seed name; returns how many were new.
#[instrument(skip(pool))]
pub async fn ensure_seed_staff(pool: &Pool<Sqlite>) -> Result<usize, AppError> {
    let mut created = 0;
    for name in SEED_STAFF {
        if register_staff(pool, name, None).await?.was_created() {
            created += 1;
        }
    }

    info!(created, "Seed staff ensured");
    Ok(created)
}

#[instrument(skip(pool))]
pub async fn list_staff(pool: &Pool<Sqlite>) -> Result<Vec<Staff>, AppError> {
    Ok(
        sqlx::query_as::<_, Staff>("SELECT id, name, email FROM staff ORDER BY id")
            .fetch_all(pool)
            .await?,
    )
}

#[instrument(skip(pool))]
pub async fn find_staff(pool: &Pool<Sqlite>, id: i64) -> Result<Staff, AppError> {
    let row = sqlx::query_as::<_, Staff>("SELECT id, name, email FROM staff WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.ok_or_else(|| AppError::NotFound(format!("Staff member with id {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn set_staff_email(
    pool: &Pool<Sqlite>,
    staff_id: i64,
    email: &str,
) -> Result<(), AppError> {
    let form = StaffEmailForm {
        email: email.trim().to_string(),
    }
    .validated()?;

    let res = sqlx::query("UPDATE staff SET email = ? WHERE id = ?")
        .bind(&form.email)
        .bind(staff_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Staff member with id {} not found",
            staff_id
        )));
    }

    info!(staff_id, "Staff email updated");
    Ok(())
}

#[instrument(skip_all, fields(username, is_admin))]
pub async fn register_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    is_admin: bool,
) -> Result<i64, AppError> {
    let form = UserForm {
        username: username.trim().to_string(),
        password: password.to_string(),
        is_admin,
    }
    .validated()?;

    let hashed_password = hash_password(&form.password)?;

    let res = sqlx::query("INSERT INTO users (username, hashed_password, is_admin) VALUES (?, ?, ?)")
        .bind(&form.username)
        .bind(&hashed_password)
        .bind(form.is_admin)
        .execute(pool)
        .await
        .map_err(|e| AppError::from_insert(e, &format!("Username '{}'", form.username)))?;

    let id = res.last_insert_rowid();
    info!(user_id = id, "User registered");
    Ok(id)
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<User, AppError> {
    authenticate(pool, username, password, false).await
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_admin(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<User, AppError> {
    authenticate(pool, username, password, true).await
}

async fn authenticate(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    admin_only: bool,
) -> Result<User, AppError> {
    let query = if admin_only {
        "SELECT id, username, hashed_password, is_admin FROM users WHERE username = ? AND is_admin = 1"
    } else {
        "SELECT id, username, hashed_password, is_admin FROM users WHERE username = ?"
    };

    let user = sqlx::query_as::<_, DbUser>(query)
        .bind(username)
        .fetch_optional(pool)
        .await?;

    match user {
        Some(user) if user.verify_password(password) => {
            info!(username, admin_only, "User authenticated");
            Ok(User::from(user))
        }
        _ => {
            warn!(username, admin_only, "Authentication failed");
            Err(AppError::Authentication(
                "Invalid username or password".to_string(),
            ))
        }
    }
}
