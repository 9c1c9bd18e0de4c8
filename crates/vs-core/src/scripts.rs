//! Well-known logical script names
//!
//! Orchestrators refer to scripts only by these names. The session pool maps
//! each name to a file through its registration table; by default the file
//! is `<script_dir>/<name>.ps1`.

use crate::types::{BackupKind, ObjectType};

pub const CONNECT: &str = "Connect-Endpoint";
pub const DISCONNECT: &str = "Disconnect-Endpoint";
pub const GET_VERSION: &str = "Get-EndpointVersion";

pub const CREATE_SNAPSHOT: &str = "New-MigrationSnapshot";
pub const VALIDATE_MIGRATION: &str = "Test-Migration";
pub const REMOVE_SOURCE: &str = "Remove-MigrationSource";

pub const MIGRATE_HOST: &str = "Move-Host";
pub const MIGRATE_VM: &str = "Move-VirtualMachine";
pub const MIGRATE_CLUSTER: &str = "Move-Cluster";

/// Script that backs up one pipeline kind
pub fn backup_script(kind: BackupKind) -> &'static str {
    match kind {
        BackupKind::SwitchConfig => "Backup-SwitchConfig",
        BackupKind::UsersGroups => "Backup-UsersGroups",
        BackupKind::Roles => "Backup-Roles",
        BackupKind::Permissions => "Backup-Permissions",
        BackupKind::HostConfig => "Backup-HostConfig",
        BackupKind::VmConfig => "Backup-VmConfig",
        BackupKind::ClusterConfig => "Backup-ClusterConfig",
        BackupKind::ResourcePools => "Backup-ResourcePools",
        BackupKind::Folders => "Backup-Folders",
    }
}

/// Script that migrates one object of the given type
pub fn migration_script(object_type: ObjectType) -> &'static str {
    match object_type {
        ObjectType::Host => MIGRATE_HOST,
        ObjectType::Vm => MIGRATE_VM,
        ObjectType::Cluster => MIGRATE_CLUSTER,
    }
}

/// Every script the orchestration engine may call
pub fn all() -> Vec<&'static str> {
    let mut names = vec![
        CONNECT,
        DISCONNECT,
        GET_VERSION,
        CREATE_SNAPSHOT,
        VALIDATE_MIGRATION,
        REMOVE_SOURCE,
        MIGRATE_HOST,
        MIGRATE_VM,
        MIGRATE_CLUSTER,
    ];
    names.extend(BackupKind::ALL.iter().map(|k| backup_script(*k)));
    names
}

/// Default file name for a logical script
pub fn default_file_name(name: &str) -> String {
    format!("{}.ps1", name)
}
