//! @acp:module "Status Codes"
//! @acp:summary "Module-partitioned status codes and their process exit status"
//! @acp:domain cli
//! @acp:layer model
//!
//! Codes follow the `MMCCNN` layout:
//!
//! - `MM`: module (10-99), owner of a disjoint range of 10000 codes
//! - `CC`: category (00-09)
//! - `NN`: module-specific detail (00-99)
//!
//! The layout is a published contract. Add codes, never renumber them.

use serde::{Deserialize, Serialize};

/// @acp:summary "Functional area that owns a code range"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Ext = 100000,
    Repo = 110000,
    Build = 120000,
    Pg = 130000,
    Pb = 140000,
    Pt = 150000,
    Pitr = 160000,
    Pe = 170000,
    Ctx = 180000,
    Sty = 200000,
    Do = 210000,
    Config = 900000,
    System = 990000,
}

impl Module {
    pub const ALL: [Module; 13] = [
        Module::Ext,
        Module::Repo,
        Module::Build,
        Module::Pg,
        Module::Pb,
        Module::Pt,
        Module::Pitr,
        Module::Pe,
        Module::Ctx,
        Module::Sty,
        Module::Do,
        Module::Config,
        Module::System,
    ];

    /// First code of the module range
    pub const fn base(self) -> i32 {
        self as i32
    }

    /// Module owning `code`, if any
    pub fn of(code: i32) -> Option<Module> {
        if code <= 0 {
            return None;
        }
        let base = (code / 10000) * 10000;
        Module::ALL.into_iter().find(|m| m.base() == base)
    }
}

/// @acp:summary "Kind of result or failure"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Success = 0,
    Param = 100,
    Perm = 200,
    Depend = 300,
    Network = 400,
    Resource = 500,
    State = 600,
    Config = 700,
    Operation = 800,
    Internal = 900,
}

impl Category {
    /// Category digits (`CC`) of a code
    pub fn of(code: i32) -> Option<Category> {
        if code < 0 {
            return None;
        }
        let cc = (code % 10000) / 100;
        let category = match cc {
            0 => Category::Success,
            1 => Category::Param,
            2 => Category::Perm,
            3 => Category::Depend,
            4 => Category::Network,
            5 => Category::Resource,
            6 => Category::State,
            7 => Category::Config,
            8 => Category::Operation,
            _ => Category::Internal,
        };
        Some(category)
    }
}

/// Compose a code from its three parts
pub const fn compose(module: Module, category: Category, detail: i32) -> i32 {
    module as i32 + category as i32 + detail
}

// Extension module
pub const CODE_EXT_INVALID_ARGS: i32 = compose(Module::Ext, Category::Param, 1);
pub const CODE_EXT_NOT_FOUND: i32 = compose(Module::Ext, Category::Resource, 1);
pub const CODE_EXT_NO_PACKAGE: i32 = compose(Module::Ext, Category::Resource, 2);
pub const CODE_EXT_CATALOG_ERROR: i32 = compose(Module::Ext, Category::Config, 1);
pub const CODE_EXT_NO_PG: i32 = compose(Module::Ext, Category::State, 1);
pub const CODE_EXT_INSTALL_FAILED: i32 = compose(Module::Ext, Category::Operation, 1);
pub const CODE_EXT_REMOVE_FAILED: i32 = compose(Module::Ext, Category::Operation, 2);

// Repository module
pub const CODE_REPO_INVALID_ARGS: i32 = compose(Module::Repo, Category::Param, 1);
pub const CODE_REPO_NOT_FOUND: i32 = compose(Module::Repo, Category::Resource, 1);
pub const CODE_REPO_ADD_FAILED: i32 = compose(Module::Repo, Category::Operation, 1);
pub const CODE_REPO_UPDATE_FAILED: i32 = compose(Module::Repo, Category::Operation, 2);

// PostgreSQL module
pub const CODE_PG_INVALID_ARGS: i32 = compose(Module::Pg, Category::Param, 1);
pub const CODE_PG_PROMOTE_NEED_FORCE: i32 = compose(Module::Pg, Category::Param, 2);
pub const CODE_PG_STATUS_NOT_RUNNING: i32 = compose(Module::Pg, Category::State, 1);
pub const CODE_PG_ALREADY_INITIALIZED: i32 = compose(Module::Pg, Category::State, 2);
pub const CODE_PG_STATUS_DATA_DIR_NOT_FOUND: i32 = compose(Module::Pg, Category::Resource, 1);
pub const CODE_PG_PERMISSION_DENIED: i32 = compose(Module::Pg, Category::Perm, 2);
pub const CODE_PG_NOT_FOUND: i32 = compose(Module::Pg, Category::Depend, 1);
pub const CODE_PG_START_FAILED: i32 = compose(Module::Pg, Category::Operation, 1);
pub const CODE_PG_STOP_FAILED: i32 = compose(Module::Pg, Category::Operation, 2);
pub const CODE_PG_RESTART_FAILED: i32 = compose(Module::Pg, Category::Operation, 3);

// pgBackRest module
pub const CODE_PB_INVALID_ARGS: i32 = compose(Module::Pb, Category::Param, 1);
pub const CODE_PB_INVALID_RESTORE_PARAMS: i32 = compose(Module::Pb, Category::Param, 2);
pub const CODE_PB_STANZA_DELETE_REQUIRES_FORCE: i32 = compose(Module::Pb, Category::Param, 3);
pub const CODE_PB_RESTORE_NEED_FORCE: i32 = compose(Module::Pb, Category::Param, 4);
pub const CODE_PB_NOT_FOUND: i32 = compose(Module::Pb, Category::Depend, 1);
pub const CODE_PB_CONFIG_NOT_FOUND: i32 = compose(Module::Pb, Category::Config, 1);
pub const CODE_PB_STANZA_NOT_FOUND: i32 = compose(Module::Pb, Category::Config, 2);
pub const CODE_PB_PG_RUNNING: i32 = compose(Module::Pb, Category::State, 1);
pub const CODE_PB_INFO_FAILED: i32 = compose(Module::Pb, Category::Operation, 1);
pub const CODE_PB_BACKUP_FAILED: i32 = compose(Module::Pb, Category::Operation, 2);
pub const CODE_PB_RESTORE_FAILED: i32 = compose(Module::Pb, Category::Operation, 3);

// Patroni module
pub const CODE_PT_SWITCHOVER_NEED_FORCE: i32 = compose(Module::Pt, Category::Param, 1);
pub const CODE_PT_FAILOVER_NEED_FORCE: i32 = compose(Module::Pt, Category::Param, 2);
pub const CODE_PT_INVALID_CONFIG_ACTION: i32 = compose(Module::Pt, Category::Param, 3);
pub const CODE_PT_REINIT_NEED_FORCE: i32 = compose(Module::Pt, Category::Param, 4);
pub const CODE_PT_NOT_FOUND: i32 = compose(Module::Pt, Category::Depend, 1);
pub const CODE_PT_NOT_RUNNING: i32 = compose(Module::Pt, Category::State, 1);
pub const CODE_PT_CONFIG_NOT_FOUND: i32 = compose(Module::Pt, Category::Config, 1);
pub const CODE_PT_COMMAND_FAILED: i32 = compose(Module::Pt, Category::Operation, 1);
pub const CODE_PT_PARSE_FAILED: i32 = compose(Module::Pt, Category::Internal, 1);

// PITR module
pub const CODE_PITR_INVALID_ARGS: i32 = compose(Module::Pitr, Category::Param, 1);
pub const CODE_PITR_NEED_FORCE: i32 = compose(Module::Pitr, Category::Param, 2);
pub const CODE_PITR_NO_BACKUP: i32 = compose(Module::Pitr, Category::Depend, 1);
pub const CODE_PITR_PG_RUNNING: i32 = compose(Module::Pitr, Category::State, 2);
pub const CODE_PITR_STOP_FAILED: i32 = compose(Module::Pitr, Category::Operation, 1);
pub const CODE_PITR_RESTORE_FAILED: i32 = compose(Module::Pitr, Category::Operation, 2);
pub const CODE_PITR_START_FAILED: i32 = compose(Module::Pitr, Category::Operation, 3);

// Context module
pub const CODE_CTX_INVALID_MODULE: i32 = compose(Module::Ctx, Category::Param, 1);
pub const CODE_CTX_COLLECTION_FAILED: i32 = compose(Module::Ctx, Category::Operation, 1);

// Pigsty module
pub const CODE_STY_CONFIGURE_INVALID_ARGS: i32 = compose(Module::Sty, Category::Param, 1);
pub const CODE_STY_DEPLOY_NEED_FORCE: i32 = compose(Module::Sty, Category::Param, 2);
pub const CODE_STY_HOME_NOT_FOUND: i32 = compose(Module::Sty, Category::Config, 1);
pub const CODE_STY_INVALID_VERSION: i32 = compose(Module::Sty, Category::Param, 3);
pub const CODE_STY_DOWNLOAD_FAILED: i32 = compose(Module::Sty, Category::Network, 1);

// Admin playbooks
pub const CODE_DO_INVALID_ARGS: i32 = compose(Module::Do, Category::Param, 1);
pub const CODE_DO_ANSIBLE_NOT_FOUND: i32 = compose(Module::Do, Category::Depend, 1);
pub const CODE_DO_PIGSTY_NOT_FOUND: i32 = compose(Module::Do, Category::Config, 1);
pub const CODE_DO_INVENTORY_NOT_FOUND: i32 = compose(Module::Do, Category::Config, 2);

// Configuration system
pub const CODE_CONFIG_LOAD_FAILED: i32 = compose(Module::Config, Category::Config, 1);

// System module: generic codes for failures nobody categorized
pub const CODE_SYSTEM_INVALID_ARGS: i32 = compose(Module::System, Category::Param, 1);
pub const CODE_SYSTEM_COMMAND_FAILED: i32 = compose(Module::System, Category::Operation, 1);

/// @acp:summary "Process exit status for a status code"
///
/// Depends only on the category digits, so every module maps alike:
/// success 0, param 2, perm 3, depend 4, network 5, resource 6, state 9,
/// config 8, operation and internal 1. Negative codes exit 1.
pub fn exit_code(code: i32) -> i32 {
    if code == 0 {
        return 0;
    }
    match Category::of(code) {
        None => 1,
        Some(Category::Success) => 0,
        Some(Category::Param) => 2,
        Some(Category::Perm) => 3,
        Some(Category::Depend) => 4,
        Some(Category::Network) => 5,
        Some(Category::Resource) => 6,
        Some(Category::State) => 9,
        Some(Category::Config) => 8,
        Some(Category::Operation) | Some(Category::Internal) => 1,
    }
}
