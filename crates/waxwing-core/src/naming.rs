//! Storage names.
//!
//! ```text
//! $global-<typ>.<b64 id>                       shared across principals
//! user.<b64 user>-<typ>.<b64 id>               per principal
//! kr.<b64 app>.<b64 keyring>-<typ>.<b64 id>    per keyring
//! ```
//!
//! Identifiers are standard base64 without padding, so names never contain
//! the `.` and `-` separators inside a component.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};

/// Cached public identities of other principals
pub const TYP_PUBLIC: &str = "@";

/// Keyring descriptors
pub const TYP_KEYRING: &str = "kr";

/// Own identity key pairs
pub const TYP_IDENTITY: &str = "id";

/// Friendships
pub const TYP_FRIENDSHIP: &str = "fr";

/// Default per-keyring key type
pub const TYP_KEY: &str = "k";

/// Canonical storage name of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageName {
    /// `$global-<typ>.<id>`
    Global {
        /// Record type
        typ: String,
        /// Identifier
        id: String,
    },
    /// `user.<user>-<typ>.<id>`
    Principal {
        /// Owning principal
        user: String,
        /// Record type
        typ: String,
        /// Identifier
        id: String,
    },
    /// `kr.<app>.<keyring>-<typ>.<id>`
    Keyring {
        /// Application namespace
        app: String,
        /// Keyring name
        keyring: String,
        /// Record type
        typ: String,
        /// Identifier
        id: String,
    },
}

impl StorageName {
    /// Global name.
    pub fn global(typ: &str, id: &str) -> Self {
        Self::Global { typ: typ.to_string(), id: id.to_string() }
    }

    /// Per-principal name.
    pub fn principal(user: &str, typ: &str, id: &str) -> Self {
        Self::Principal { user: user.to_string(), typ: typ.to_string(), id: id.to_string() }
    }

    /// Per-keyring name.
    pub fn keyring(app: &str, keyring: &str, typ: &str, id: &str) -> Self {
        Self::Keyring {
            app: app.to_string(),
            keyring: keyring.to_string(),
            typ: typ.to_string(),
            id: id.to_string(),
        }
    }

    /// Global name of the descriptor of keyring `app`/`keyring`.
    ///
    /// The two parts are encoded separately before joining, so distinct
    /// pairs never share a descriptor.
    pub fn keyring_descriptor(app: &str, keyring: &str) -> Self {
        Self::global(TYP_KEYRING, &format!("{}.{}", encode(app), encode(keyring)))
    }

    /// Prefix shared by every global record of type `typ`.
    pub fn global_prefix(typ: &str) -> String {
        format!("$global-{typ}.")
    }

    /// Prefix shared by every record of type `typ` owned by `user`.
    pub fn principal_prefix(user: &str, typ: &str) -> String {
        format!("user.{}-{typ}.", encode(user))
    }

    /// Prefix shared by every per-principal record.
    pub fn any_principal_prefix() -> &'static str {
        "user."
    }

    /// Prefix shared by every per-keyring record.
    pub fn any_keyring_prefix() -> &'static str {
        "kr."
    }

    /// Parse a rendered name.
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(rest) = name.strip_prefix("$global-") {
            let (typ, id) = rest.split_once('.')?;
            return Some(Self::Global { typ: typ.to_string(), id: decode(id)? });
        }
        if let Some(rest) = name.strip_prefix("user.") {
            let (user, rest) = rest.split_once('-')?;
            let (typ, id) = rest.split_once('.')?;
            return Some(Self::Principal { user: decode(user)?, typ: typ.to_string(), id: decode(id)? });
        }
        if let Some(rest) = name.strip_prefix("kr.") {
            let (app, rest) = rest.split_once('.')?;
            let (keyring, rest) = rest.split_once('-')?;
            let (typ, id) = rest.split_once('.')?;
            return Some(Self::Keyring {
                app: decode(app)?,
                keyring: decode(keyring)?,
                typ: typ.to_string(),
                id: decode(id)?,
            });
        }
        None
    }

    /// Record type component.
    pub fn typ(&self) -> &str {
        match self {
            Self::Global { typ, .. } | Self::Principal { typ, .. } | Self::Keyring { typ, .. } => typ,
        }
    }

    /// Identifier component.
    pub fn id(&self) -> &str {
        match self {
            Self::Global { id, .. } | Self::Principal { id, .. } | Self::Keyring { id, .. } => id,
        }
    }
}

impl fmt::Display for StorageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global { typ, id } => write!(f, "$global-{typ}.{}", encode(id)),
            Self::Principal { user, typ, id } => {
                write!(f, "user.{}-{typ}.{}", encode(user), encode(id))
            },
            Self::Keyring { app, keyring, typ, id } => {
                write!(f, "kr.{}.{}-{typ}.{}", encode(app), encode(keyring), encode(id))
            },
        }
    }
}

fn encode(component: &str) -> String {
    STANDARD_NO_PAD.encode(component)
}

fn decode(component: &str) -> Option<String> {
    String::from_utf8(STANDARD_NO_PAD.decode(component).ok()?).ok()
}
