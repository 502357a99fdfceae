use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub membership_tier: String,
}

#[derive(Debug, Clone, AsChangeset, Deserialize)]
#[diesel(table_name = crate::schema::users)]
pub struct UserChange {
    pub name: String,
    pub email: String,
    pub membership_tier: String,
}

pub const MEMBERSHIP_TIERS: &[&str] = &["Basic", "Premium", "VIP"];
