use serde::Serialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::users::repo_types::{Gender, User, UserRole};

/// How much of a user record a reader may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ViewScope {
    Public,
    /// Company and recruiter linked by an active assignment.
    Associate,
    /// The user themself, an admin, or a sibling service.
    Full,
}

#[derive(Debug, Clone, Copy)]
pub enum Requester<'a> {
    User(&'a User),
    InternalService,
}

/// `associated` is whether an active recruiter link joins requester and target.
pub fn view_scope(requester: Requester<'_>, target: &User, associated: bool) -> ViewScope {
    match requester {
        Requester::InternalService => ViewScope::Full,
        Requester::User(me) if me.id == target.id || me.role == UserRole::Admin => ViewScope::Full,
        Requester::User(_) if associated => ViewScope::Associate,
        _ => ViewScope::Public,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserView {
    pub id: Uuid,
    pub role: UserRole,
    pub name: String,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<Date>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_analysis: Option<serde_json::Value>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub created_at: Option<OffsetDateTime>,
}

pub fn project(scope: ViewScope, user: &User) -> UserView {
    let associate = scope >= ViewScope::Associate;
    let full = scope == ViewScope::Full;
    UserView {
        id: user.id,
        role: user.role,
        name: user.name.clone(),
        verified: user.verified,
        surname: user.surname.clone(),
        description: user.description.clone(),
        profile_picture: user.profile_picture.clone(),
        email: associate.then(|| user.email.clone()),
        gender: user.gender.filter(|_| associate),
        cv_filename: user.cv_filename.clone().filter(|_| associate),
        email_verified: full.then_some(user.email_verified),
        birth_date: user.birth_date.filter(|_| full),
        cv_analysis: user.cv_analysis.clone().filter(|_| full),
        created_at: full.then_some(user.created_at),
    }
}
