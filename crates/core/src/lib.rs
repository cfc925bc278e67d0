pub mod config;
pub mod decision;
pub mod domain;
pub mod eligibility;
pub mod errors;
pub mod ledger;
pub mod service;
pub mod store;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use decision::recompute;
pub use domain::expense::{Expense, ExpenseId, ExpenseStatus, Vote, VoteDecision};
pub use domain::rule::{ApprovalRule, RuleId, RuleKind, RuleOutcome};
pub use domain::user::{CompanyId, Role, User, UserId};
pub use eligibility::EligibilityResolver;
pub use errors::{ApplicationError, InterfaceError, VoteError};
pub use service::{ApprovalService, PendingApproval, VoteRequest};
pub use store::{ExpenseStore, RuleStore, StoreError, UserStore};
