//! Which roles satisfy which operation. Kept as data so the mapping reads as
//! a single table rather than being scattered through handler bodies.

use crate::models::Role;

pub const RECEIPT_UPLOAD: &[Role] = &[Role::Imam];
pub const RECEIPT_VIEW: &[Role] = &[Role::Finance, Role::Auditor];
pub const RECEIPT_TAGGING: &[Role] = &[Role::Finance];
pub const REPORT_VIEW: &[Role] = &[Role::Finance, Role::Auditor];
pub const USER_ADMIN: &[Role] = &[Role::Admin];
