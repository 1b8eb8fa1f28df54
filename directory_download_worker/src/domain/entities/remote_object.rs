/// An object of the object storage, as returned when listing a prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Full name (key) of the object, including the listed prefix
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

/// One page of a paginated object listing
#[derive(Debug, Clone, Default)]
pub struct ObjectListPage {
    pub objects: Vec<RemoteObject>,
    /// Token to give to the next listing call, `None` on the last page
    pub next_continuation_token: Option<String>,
}
