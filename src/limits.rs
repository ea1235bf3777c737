pub const MAX_TENANTS: usize = 64;
pub const MAX_TENANT_NAME_LEN: usize = 128;

/// Records (pending + approved) one hall may carry on one date.
pub const MAX_RECORDS_PER_DAY: usize = 64;

pub const MAX_EVENT_NAME_LEN: usize = 512;
pub const MAX_FIELD_LEN: usize = 256;

/// Documents accepted from one legacy export file.
pub const MAX_IMPORT_DOCUMENTS: usize = 100_000;
