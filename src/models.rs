use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::settlement::{Ledger, LedgerEntry};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
}

#[derive(Deserialize, Debug)]
pub struct RegisterPayload {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

/// A roster entry. The name is the identity: there is no separate numeric id,
/// so renaming a member is the same as removing one and adding another.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub active: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub activity_type: String,
    /// Ordered roster; `members[0]` is always the creator.
    pub members: Vec<Member>,
    pub creator: String,
    pub is_prepaid: bool,
    /// Present only when `is_prepaid` is set.
    pub keeper: Option<String>,
    pub remark: String,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Bill {
    pub id: String,
    pub activity_id: String,
    pub title: String,
    pub bill_type: String,
    pub amount: f64,
    pub payer: String,
    /// Member name -> participation weight. Weight 0 keeps the member on the
    /// bill without sharing its cost.
    pub participants: BTreeMap<String, f64>,
    /// Member name -> owed amount, derived by the split calculator.
    pub split_detail: BTreeMap<String, f64>,
    pub bill_time: i64,
    pub remark: String,
    pub creator: String,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Recharge {
    pub id: String,
    pub activity_id: String,
    pub amount: f64,
    /// The depositor.
    pub payer: String,
    /// Must equal the activity keeper.
    pub keeper: String,
    pub recharge_date: i64,
    pub recorder: String,
    pub creator: String,
    /// Set when this recharge was auto-created for a bill whose payer was not
    /// the keeper; deleting either record cascades to the other.
    pub source_bill_id: Option<String>,
    pub created_at: i64,
}

#[derive(Deserialize, Debug)]
pub struct CreateActivityPayload {
    pub name: String,
    #[serde(default)]
    pub activity_type: String,
    pub member_names: Vec<String>,
    #[serde(default)]
    pub is_prepaid: bool,
    #[serde(default)]
    pub keeper: Option<String>,
    #[serde(default)]
    pub remark: String,
}

#[derive(Deserialize, Debug)]
pub struct UpdateActivityPayload {
    pub name: String,
    #[serde(default)]
    pub activity_type: String,
    pub member_names: Vec<String>,
    #[serde(default)]
    pub keeper: Option<String>,
    #[serde(default)]
    pub remark: String,
}

#[derive(Deserialize, Debug)]
pub struct CreateBillPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub bill_type: String,
    pub amount: f64,
    pub payer: String,
    pub participants: BTreeMap<String, f64>,
    pub bill_time: Option<i64>,
    #[serde(default)]
    pub remark: String,
}

#[derive(Deserialize, Debug)]
pub struct CreateRechargePayload {
    pub amount: f64,
    pub payer: String,
    pub recharge_date: Option<i64>,
}

#[derive(Serialize, Debug)]
pub struct CreateBillResponse {
    pub bill: Bill,
    /// In prepaid mode the recorded payer may differ from the member who
    /// actually paid; the original payer is reported here.
    pub original_payer: Option<String>,
    pub auto_recharge: Option<Recharge>,
}

#[derive(Serialize, Debug)]
pub struct ActivityListResponse {
    pub activities: Vec<Activity>,
    pub total_count: u32,
}

/// Everything the activity view renders: raw records plus the ledger
/// recomputed from them on this read.
#[derive(Serialize, Debug)]
pub struct ActivityDetailResponse {
    pub activity: Activity,
    pub bills: Vec<Bill>,
    pub recharges: Vec<Recharge>,
    pub ledger: Ledger,
    pub suggested_next_payer: Option<LedgerEntry>,
    pub total_spent: f64,
    pub total_recharged: f64,
    pub remaining: f64,
    pub date_range: String,
}
