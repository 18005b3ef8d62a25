//! Internal column names of the directory attributes.
//!
//! The datatable names its columns after the attribute syntax and identifier,
//! e.g. `ATTk589914` is the binary (`k`) attribute 589914, `unicodePwd`.

pub const OBJECT_SID: &str = "ATTr589970";
pub const OBJECT_GUID: &str = "ATTk589826";
pub const NAME: &str = "ATTm3";
pub const SAM_ACCOUNT_NAME: &str = "ATTm590045";
pub const USER_PRINCIPAL_NAME: &str = "ATTm590480";
pub const SAM_ACCOUNT_TYPE: &str = "ATTj590126";
pub const USER_ACCOUNT_CONTROL: &str = "ATTj589832";
pub const PRIMARY_GROUP_ID: &str = "ATTj589922";
pub const LOGON_COUNT: &str = "ATTj589993";
pub const PWD_LAST_SET: &str = "ATTq589920";
pub const LAST_LOGON_TIMESTAMP: &str = "ATTq589876";
pub const ACCOUNT_EXPIRES: &str = "ATTq589983";
pub const USN_CREATED: &str = "ATTq131091";
pub const USN_CHANGED: &str = "ATTq131192";

/// The encrypted NT hash.
pub const UNICODE_PWD: &str = "ATTk589914";
/// The encrypted LM hash.
pub const DBCS_PWD: &str = "ATTk589879";
pub const NT_PWD_HISTORY: &str = "ATTk589918";
pub const LM_PWD_HISTORY: &str = "ATTk589984";
pub const SUPPLEMENTAL_CREDENTIALS: &str = "ATTk589949";
/// The encrypted password encryption keys. Only one row of the datatable carries it.
pub const PEK_LIST: &str = "ATTk590689";

/// Returns the LDAP display name of a known column.
pub fn display_name(column: &str) -> Option<&'static str> {
    Some(match column {
        OBJECT_SID => "objectSid",
        OBJECT_GUID => "objectGUID",
        NAME => "name",
        SAM_ACCOUNT_NAME => "sAMAccountName",
        USER_PRINCIPAL_NAME => "userPrincipalName",
        SAM_ACCOUNT_TYPE => "sAMAccountType",
        USER_ACCOUNT_CONTROL => "userAccountControl",
        PRIMARY_GROUP_ID => "primaryGroupID",
        LOGON_COUNT => "logonCount",
        PWD_LAST_SET => "pwdLastSet",
        LAST_LOGON_TIMESTAMP => "lastLogonTimestamp",
        ACCOUNT_EXPIRES => "accountExpires",
        USN_CREATED => "uSNCreated",
        USN_CHANGED => "uSNChanged",
        UNICODE_PWD => "unicodePwd",
        DBCS_PWD => "dBCSPwd",
        NT_PWD_HISTORY => "ntPwdHistory",
        LM_PWD_HISTORY => "lmPwdHistory",
        SUPPLEMENTAL_CREDENTIALS => "supplementalCredentials",
        PEK_LIST => "pekList",
        _ => return None,
    })
}

/// The `sAMAccountType` values of the accounts that carry credentials.
pub mod account_type {
    pub const NORMAL_USER: u32 = 0x3000_0000;
    pub const MACHINE: u32 = 0x3000_0001;
    pub const TRUST: u32 = 0x3000_0002;

    pub const ALL: [u32; 3] = [NORMAL_USER, MACHINE, TRUST];
}

/// The `userAccountControl` flag of disabled accounts.
pub const ACCOUNT_DISABLE: u32 = 0x0002;
