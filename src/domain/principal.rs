/// The authenticated caller of a plan query or payment initiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Principal {
    pub user_id: u64,
}

impl Principal {
    pub fn new(user_id: u64) -> Self {
        Self { user_id }
    }
}
