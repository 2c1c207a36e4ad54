use std::io::{self, BufRead, Write};

use chrono::NaiveDateTime;
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::auth::User;
use crate::db::{
    authenticate_admin, authenticate_user, edit_client, ensure_seed_staff, find_client,
    find_staff, list_proposals, list_staff, register_client, register_proposal, register_staff,
    register_user, set_staff_email,
};
use crate::error::{AppError, OrLog};
use crate::models::{Client, ClientField, DATE_TIME_FORMAT, NewProposal, Registration};
use crate::notifier::{Mailer, scan_and_notify};
use crate::validation::ClientForm;

pub struct Menu<'a, R, W, M> {
    pool: &'a Pool<Sqlite>,
    mailer: &'a M,
    input: R,
    output: W,
    clock: fn() -> NaiveDateTime,
    session: Option<User>,
}

pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

impl<'a, R: BufRead, W: Write, M: Mailer> Menu<'a, R, W, M> {
    pub fn new(pool: &'a Pool<Sqlite>, mailer: &'a M, input: R, output: W) -> Self {
        Self {
            pool,
            mailer,
            input,
            output,
            clock: local_now,
            session: None,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn session(&self) -> Option<&User> {
        self.session.as_ref()
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs until the user exits or input ends.
    pub async fn run(&mut self) -> io::Result<()> {
        writeln!(self.output, "Proposal System - Environmental Licensing")?;

        loop {
            let keep_going = if self.session.is_none() {
                self.logged_out_step().await?
            } else {
                self.logged_in_step().await?
            };
            if !keep_going {
                return Ok(());
            }
        }
    }

    async fn logged_out_step(&mut self) -> io::Result<bool> {
        writeln!(
            self.output,
            "\n1. Register user\n2. Log in\n3. Log in as administrator\n4. Exit"
        )?;
        let Some(choice) = self.prompt("Choose an option: ")? else {
            return Ok(false);
        };

        match choice.as_str() {
            "1" => self.register_user().await?,
            "2" => self.log_in(false).await?,
            "3" => self.log_in(true).await?,
            "4" => return Ok(false),
            _ => writeln!(self.output, "Invalid option.")?,
        }
        Ok(true)
    }

    async fn logged_in_step(&mut self) -> io::Result<bool> {
        let is_admin = self.session.as_ref().is_some_and(|u| u.is_admin);

        writeln!(
            self.output,
            "\n1. Register client\n2. Register proposal\n3. Check deadlines and send notifications\n4. List proposals\n5. Log out"
        )?;
        if is_admin {
            writeln!(self.output, "6. Register staff member\n7. Set staff email")?;
        }
        let Some(choice) = self.prompt("Choose an option: ")? else {
            return Ok(false);
        };

        match (choice.as_str(), is_admin) {
            ("1", _) => self.register_client().await?,
            ("2", _) => self.register_proposal().await?,
            ("3", _) => self.scan_deadlines().await?,
            ("4", _) => self.list_proposals().await?,
            ("5", _) => {
                if let Some(user) = self.session.take() {
                    info!(username = %user.username, "User logged out");
                }
            }
            ("6", true) => self.register_staff().await?,
            ("7", true) => self.set_staff_email().await?,
            _ => writeln!(self.output, "Invalid option.")?,
        }
        Ok(true)
    }

    async fn register_user(&mut self) -> io::Result<()> {
        let username = self.prompt_value("Username: ")?;
        let password = self.prompt_value("Password: ")?;
        let is_admin = self.prompt_yes_no("Administrator? (y/n): ")?;

        let result = register_user(self.pool, &username, &password, is_admin).await;
        self.report(result, "User registration", |id| {
            format!("User '{}' registered with ID {}.", username, id)
        })
    }

    async fn log_in(&mut self, admin_only: bool) -> io::Result<()> {
        let username = self.prompt_value("Username: ")?;
        let password = self.prompt_value("Password: ")?;

        let result = if admin_only {
            authenticate_admin(self.pool, &username, &password).await
        } else {
            authenticate_user(self.pool, &username, &password).await
        };

        match result.or_log("Login") {
            Some(user) => {
                writeln!(self.output, "Welcome {}!", user.username)?;
                self.session = Some(user);
            }
            None => writeln!(self.output, "Incorrect username or password.")?,
        }
        Ok(())
    }

    async fn register_client(&mut self) -> io::Result<()> {
        let form = ClientForm {
            tax_id: self.prompt_value("Tax ID: ")?,
            requester_name: self.prompt_value("Requester name: ")?,
            phone: self.prompt_value("Phone: ")?,
            email: self.prompt_value("Email: ")?,
        };

        let Some(registration) = register_client(self.pool, form)
            .await
            .or_log("Client registration")
        else {
            writeln!(self.output, "Client could not be registered.")?;
            return Ok(());
        };

        let client_id = match registration {
            Registration::Existing(id) => {
                writeln!(self.output, "Client already registered with ID {}.", id)?;
                return Ok(());
            }
            Registration::Created(id) => id,
        };

        let Some(client) = find_client(self.pool, client_id)
            .await
            .or_log("Client lookup")
        else {
            return Ok(());
        };
        writeln!(self.output, "Client registered with ID {}.", client.id)?;
        self.confirm_client(client).await
    }

    /// Lets the user fix fields one at a time until they confirm the record.
    async fn confirm_client(&mut self, mut client: Client) -> io::Result<()> {
        loop {
            writeln!(self.output, "Client data: {}", client)?;
            let Some(answer) = self.prompt("Is the data correct? (y/n): ")? else {
                return Ok(());
            };

            match answer.to_lowercase().as_str() {
                "y" => return Ok(()),
                "n" => {
                    let names: Vec<&str> = ClientField::ALL.iter().map(|f| f.as_str()).collect();
                    let field =
                        self.prompt_value(&format!("Field to edit ({}): ", names.join("/")))?;
                    let value = self.prompt_value(&format!("New value for {}: ", field))?;

                    match edit_client(self.pool, client.id, &field, &value).await {
                        Ok(updated) => {
                            writeln!(self.output, "Client updated.")?;
                            client = updated;
                        }
                        Err(err) => {
                            err.log_and_record("Client edit");
                            writeln!(self.output, "Edit rejected: {}", err)?;
                        }
                    }
                }
                _ => writeln!(self.output, "Invalid option. Type 'y' for yes or 'n' for no.")?,
            }
        }
    }

    async fn register_proposal(&mut self) -> io::Result<()> {
        let client_id = self.prompt_value("Client ID: ")?;
        let Ok(client_id) = client_id.parse::<i64>() else {
            AppError::Validation(format!("Client ID must be a number, got '{}'", client_id))
                .log_and_record("Proposal registration");
            writeln!(self.output, "Invalid client ID.")?;
            return Ok(());
        };

        let environmental_authority =
            self.prompt_value("Environmental authority (Municipal/INEA/ANA/CETESB): ")?;
        let process_type =
            self.prompt_value("Process type (LO, Preliminary Assessment, LI, Certificates): ")?;
        let renewal = self.prompt_yes_no("Renewal? (y/n): ")?;
        let document_number = if renewal {
            non_empty(self.prompt_value("Document number: ")?)
        } else {
            None
        };
        let validity = self.prompt_value("Proposal validity (YYYY-MM-DD): ")?;
        let monthly = self.prompt_yes_no("Monthly? (y/n): ")?;
        let responsible_id = self.choose_staff().await?;
        let work_type = non_empty(self.prompt_value("Work type: ")?);
        let meeting_at = non_empty(self.prompt_value("Meeting date and time (YYYY-MM-DD HH:MM): ")?);
        let delivery_deadline =
            non_empty(self.prompt_value("Delivery deadline (YYYY-MM-DD HH:MM): ")?);
        let notes = non_empty(self.prompt_value("Notes: ")?);

        let input = NewProposal {
            client_id,
            environmental_authority,
            process_type,
            renewal,
            document_number,
            validity,
            monthly,
            responsible_id,
            work_type,
            meeting_at,
            delivery_deadline,
            notes,
        };

        let result = register_proposal(self.pool, input).await;
        self.report(result, "Proposal registration", |id| {
            format!("Proposal registered with ID {}.", id)
        })
    }

    async fn choose_staff(&mut self) -> io::Result<Option<i64>> {
        let staff = list_staff(self.pool)
            .await
            .or_log("Staff listing")
            .unwrap_or_default();

        writeln!(self.output, "\nSelect the responsible staff member:")?;
        for (idx, member) in staff.iter().enumerate() {
            writeln!(self.output, "{}. {}", idx + 1, member.name)?;
        }

        let choice = self.prompt_value("Choose an option (blank for none): ")?;
        let picked = choice
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| staff.get(idx))
            .map(|member| member.id);

        if picked.is_none() && !choice.is_empty() {
            writeln!(self.output, "Invalid choice, no responsible staff assigned.")?;
        }
        Ok(picked)
    }

    async fn scan_deadlines(&mut self) -> io::Result<()> {
        let now = (self.clock)();
        let result = scan_and_notify(self.pool, self.mailer, now).await;
        self.report(result, "Deadline scan", |report| {
            format!(
                "{} proposal(s) due: {} notified, {} failed, {} skipped.",
                report.due, report.sent, report.failed, report.skipped
            )
        })
    }

    async fn list_proposals(&mut self) -> io::Result<()> {
        let Some(proposals) = list_proposals(self.pool).await.or_log("Proposal listing") else {
            writeln!(self.output, "Proposals could not be listed.")?;
            return Ok(());
        };
        if proposals.is_empty() {
            return writeln!(self.output, "No proposals registered.");
        }

        let staff = list_staff(self.pool)
            .await
            .or_log("Staff listing")
            .unwrap_or_default();
        for proposal in proposals {
            let responsible = proposal
                .responsible_id
                .and_then(|id| staff.iter().find(|s| s.id == id))
                .map_or("-", |s| s.name.as_str());
            let deadline = proposal
                .delivery_deadline
                .map_or_else(|| "-".to_string(), |d| d.format(DATE_TIME_FORMAT).to_string());
            writeln!(
                self.output,
                "#{} client {} | {} / {} | deadline {} | responsible {}",
                proposal.id,
                proposal.client_id,
                proposal.environmental_authority,
                proposal.process_type,
                deadline,
                responsible
            )?;
        }
        Ok(())
    }

    async fn register_staff(&mut self) -> io::Result<()> {
        let name = self.prompt_value("Staff name: ")?;
        let email = non_empty(self.prompt_value("Email (blank for none): ")?);

        let result = register_staff(self.pool, &name, email.as_deref()).await;
        self.report(result, "Staff registration", |registration| match registration {
            Registration::Created(id) => format!("Staff member registered with ID {}.", id),
            Registration::Existing(id) => format!("Staff member already registered with ID {}.", id),
        })
    }

    async fn set_staff_email(&mut self) -> io::Result<()> {
        let Some(staff_id) = self.choose_staff().await? else {
            return Ok(());
        };
        let email = self.prompt_value("Email: ")?;

        let result = match set_staff_email(self.pool, staff_id, &email).await {
            Ok(()) => find_staff(self.pool, staff_id).await,
            Err(err) => Err(err),
        };
        self.report(result, "Staff email update", |staff| {
            format!(
                "Email for {} set to {}.",
                staff.name,
                staff.email.unwrap_or_default()
            )
        })
    }

    fn report<T>(
        &mut self,
        result: Result<T, AppError>,
        ctx: &str,
        describe: impl FnOnce(T) -> String,
    ) -> io::Result<()> {
        match result {
            Ok(value) => writeln!(self.output, "{}", describe(value)),
            Err(err) => {
                err.log_and_record(ctx);
                writeln!(self.output, "{} failed ({}): {}", ctx, err.kind(), err)
            }
        }
    }

    /// `None` once input is exhausted.
    fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", label)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn prompt_value(&mut self, label: &str) -> io::Result<String> {
        Ok(self.prompt(label)?.unwrap_or_default())
    }

    fn prompt_yes_no(&mut self, label: &str) -> io::Result<bool> {
        Ok(self.prompt_value(label)?.eq_ignore_ascii_case("y"))
    }
}

/// Seeds staff before the menu opens; failures are logged and ignored.
pub async fn prepare(pool: &Pool<Sqlite>) {
    ensure_seed_staff(pool).await.or_log("Staff seeding");
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
