//! User accounts.
//!
//! Account creation is two-phase: the identity provider account first, the
//! profile item second. A failure between the phases leaves an orphan
//! account in the provider that has no profile row; there is no rollback
//! and no background reconciliation.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::collab::{AuthOutcome, IdentityProvider};
use crate::domain::{Role, UserFilter};
use crate::error::{DomainError, Result};
use crate::keys;
use crate::schema;
use crate::storage::{Filter, Item, ItemExt, QuerySpec, TableStore};

use super::{AuditLog, STATUS_ACTIVE};

/// Stored date-of-birth wire format.
const DOB_FORMAT: &str = "%d-%m-%Y";

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub code_user: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub date_of_birth: Option<String>,
    pub avatar: Option<String>,
    pub status: i32,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl UserProfile {
    pub(crate) fn from_item(item: &Item) -> Result<Self> {
        let pk = item.req_s(schema::PK)?;
        Ok(Self {
            id: keys::strip(keys::USER_PREFIX, pk).to_string(),
            code_user: item.opt_s(schema::CODE_USER)?.map(str::to_string),
            name: item.opt_s(schema::NAME)?.unwrap_or_default().to_string(),
            email: item.opt_s(schema::EMAIL)?.map(str::to_string),
            role: item.opt_s(schema::ROLE_NAME)?.and_then(|r| Role::parse(r).ok()),
            date_of_birth: item.opt_s(schema::DATE_OF_BIRTH)?.map(str::to_string),
            avatar: item.opt_s(schema::AVATAR)?.map(str::to_string),
            status: item.opt_i32(schema::STATUS)?.unwrap_or(STATUS_ACTIVE),
            created_at: item.opt_s(schema::CREATED_AT)?.map(str::to_string),
            updated_at: item.opt_s(schema::UPDATED_AT)?.map(str::to_string),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    /// Human-assigned code (student/lecturer number). Uppercased and used
    /// as the account id when present; otherwise a UUID is generated.
    pub code_user: Option<String>,
    pub name: String,
    pub email: String,
    pub temporary_password: String,
    pub role: Role,
    pub date_of_birth: Option<String>,
}

/// Fields a profile update may change. `None` leaves the stored value.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date_of_birth: Option<String>,
    pub avatar: Option<String>,
}

pub struct UserRepository {
    store: Arc<dyn TableStore>,
    identity: Arc<dyn IdentityProvider>,
    audit: AuditLog,
}

impl UserRepository {
    pub fn new(store: Arc<dyn TableStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        let audit = AuditLog::new(store.clone());
        Self {
            store,
            identity,
            audit,
        }
    }

    /// Register an account and write its profile.
    pub async fn create(&self, new: NewUser) -> Result<UserProfile> {
        if new.name.trim().is_empty() {
            return Err(DomainError::Validation("name is required".into()));
        }
        if new.email.trim().is_empty() {
            return Err(DomainError::Validation("email is required".into()));
        }
        if let Some(dob) = &new.date_of_birth {
            NaiveDate::parse_from_str(dob, DOB_FORMAT).map_err(|_| {
                DomainError::Validation(format!("date of birth must be dd-MM-yyyy, got {dob}"))
            })?;
        }

        let user_id = match &new.code_user {
            Some(code) if !code.trim().is_empty() => code.trim().to_uppercase(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let key = keys::user_profile(&user_id);
        if self.store.get(&key).await?.is_some() {
            return Err(DomainError::Conflict(format!("user {user_id} already exists")));
        }

        self.identity
            .create_account(&user_id, &new.email, &new.temporary_password)
            .await?;

        let now = super::now();
        let avatar = format!(
            "https://ui-avatars.com/api/?name={}",
            new.name.replace(' ', "+")
        );

        let mut item = crate::storage::item::keyed(&key);
        item.set_s(schema::GSI1_PK, new.role.search_key());
        item.set_s(schema::GSI1_SK, keys::name_sort_key(&new.name));
        item.set_s(schema::ID, key.pk.clone());
        item.set_opt_s(
            schema::CODE_USER,
            new.code_user.map(|c| c.trim().to_uppercase()),
        );
        item.set_s(schema::NAME, new.name);
        item.set_s(schema::EMAIL, new.email);
        item.set_s(schema::ROLE_NAME, new.role.as_str());
        item.set_opt_s(schema::DATE_OF_BIRTH, new.date_of_birth);
        item.set_s(schema::AVATAR, avatar);
        item.set_i32(schema::STATUS, STATUS_ACTIVE);
        item.set_s(schema::CREATED_AT, now.clone());
        item.set_s(schema::UPDATED_AT, now);

        let profile = UserProfile::from_item(&item)?;
        if let Err(err) = self.store.put(item).await {
            // the provider account already exists and stays behind
            warn!(user_id = %user_id, error = %err, "Profile write failed after account creation");
            return Err(err.into());
        }

        info!(user_id = %user_id, role = %profile.role.map(|r| r.as_str()).unwrap_or("?"), "User created");
        self.audit
            .record(
                Some("ADMIN"),
                "CREATE_USER",
                &format!("Created user {user_id}"),
                None,
            )
            .await;

        Ok(profile)
    }

    pub async fn get(&self, user_id: &str) -> Result<UserProfile> {
        let item = self
            .store
            .get(&keys::user_profile(user_id))
            .await?
            .ok_or_else(|| DomainError::not_found("user", user_id))?;
        UserProfile::from_item(&item)
    }

    /// Look a profile up by email. A table scan; reserved for the login
    /// path where only the token's email is known.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserProfile>> {
        let filter = Filter::eq_s(schema::EMAIL, email)
            .and(Filter::eq_s(schema::SK, keys::SK_PROFILE));
        let items = self.store.scan(filter).await?;
        items.first().map(UserProfile::from_item).transpose()
    }

    /// Partial profile update; a rename also refreshes the search sort key.
    pub async fn update(&self, user_id: &str, update: UserUpdate) -> Result<UserProfile> {
        let key = keys::user_profile(user_id);
        let mut item = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("user", user_id))?;

        if let Some(name) = &update.name {
            if !name.is_empty() {
                item.set_s(schema::NAME, name.clone());
                item.set_s(schema::GSI1_SK, keys::name_sort_key(name));
            }
        }
        if let Some(email) = update.email {
            item.set_s(schema::EMAIL, email);
        }
        if let Some(dob) = update.date_of_birth {
            NaiveDate::parse_from_str(&dob, DOB_FORMAT).map_err(|_| {
                DomainError::Validation(format!("date of birth must be dd-MM-yyyy, got {dob}"))
            })?;
            item.set_s(schema::DATE_OF_BIRTH, dob);
        }
        if let Some(avatar) = update.avatar {
            item.set_s(schema::AVATAR, avatar);
        }
        item.set_s(schema::UPDATED_AT, super::now());

        let profile = UserProfile::from_item(&item)?;
        self.store.put(item).await?;
        Ok(profile)
    }

    /// Activate or deactivate an account profile. The identity-provider
    /// account is left untouched.
    pub async fn set_status(&self, user_id: &str, active: bool) -> Result<()> {
        let key = keys::user_profile(user_id);
        let mut item = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("user", user_id))?;

        item.set_i32(schema::STATUS, if active { 1 } else { 0 });
        item.set_s(schema::UPDATED_AT, super::now());
        self.store.put(item).await?;

        let action = if active { "ACTIVATE_USER" } else { "DEACTIVATE_USER" };
        self.audit
            .record(
                Some("ADMIN"),
                action,
                &format!("Set user {user_id} active={active}"),
                None,
            )
            .await;
        Ok(())
    }

    /// Search users. With a role, the role partition is queried; without
    /// one the whole table is scanned for profile rows. The keyword matches
    /// the lowercased name sort key, the email, or the user code.
    pub async fn search(
        &self,
        keyword: &str,
        role: Option<Role>,
        filter: &UserFilter,
    ) -> Result<Vec<UserProfile>> {
        let keyword_filter = (!keyword.is_empty()).then(|| {
            Filter::contains(schema::GSI1_SK, keyword.to_lowercase())
                .or(Filter::contains(schema::EMAIL, keyword.to_string()))
                .or(Filter::contains(schema::CODE_USER, keyword.to_string()))
        });

        let items = match role {
            Some(role) => {
                let mut spec = QuerySpec::gsi1(role.search_key());
                if let Some(f) = keyword_filter {
                    spec = spec.filter(f);
                }
                self.store.query(spec).await?
            }
            None => {
                let mut scan_filter = Filter::begins_with(schema::PK, keys::USER_PREFIX)
                    .and(Filter::eq_s(schema::SK, keys::SK_PROFILE));
                if let Some(f) = keyword_filter {
                    scan_filter = scan_filter.and(f);
                }
                self.store.scan(scan_filter).await?
            }
        };

        let mut profiles: Vec<UserProfile> = items
            .iter()
            .map(UserProfile::from_item)
            .collect::<Result<_>>()?;
        if let Some(status) = filter.status {
            profiles.retain(|p| p.status == status);
        }
        Ok(profiles)
    }

    /// Verify credentials against the identity provider.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthOutcome> {
        Ok(self.identity.authenticate(username, password).await?)
    }

    /// Answer a forced-password-change challenge.
    pub async fn complete_challenge(
        &self,
        username: &str,
        session: &str,
        new_password: &str,
    ) -> Result<AuthOutcome> {
        Ok(self
            .identity
            .respond_to_challenge(username, session, new_password)
            .await?)
    }

    /// Resolve the profile behind an access token via the provider email.
    pub async fn profile_for_token(&self, access_token: &str) -> Result<UserProfile> {
        let email = self.identity.email_for_token(access_token).await?;
        self.find_by_email(&email)
            .await?
            .ok_or_else(|| DomainError::not_found("user", &email))
    }
}
