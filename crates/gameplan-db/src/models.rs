/// Database row types — these map directly to SQLite rows.
/// Distinct from the gameplan-types API shapes to keep the DB layer
/// independent. All timestamps are RFC 3339 text (see `now_ts`).

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub agreed_to_terms: bool,
    pub email_verified: bool,
    pub is_subscribed: bool,
    pub subscription_ref: Option<String>,
    pub customer_ref: Option<String>,
    pub trial_ends_at: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub user_id: String,
    pub refresh_token: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: String,
    pub expires_at: String,
}

#[derive(Debug, Clone)]
pub struct ResetCodeRow {
    pub email: String,
    pub code: String,
    pub expires_at: String,
}

#[derive(Debug, Clone)]
pub struct PlanRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct ClassRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub schedule_info: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: String,
    pub pair_key: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub created_at: String,
}

/// One entry of a user's chat listing: the chat, its full participant set,
/// and the newest message if any.
#[derive(Debug, Clone)]
pub struct ThreadRow {
    pub chat: ChatRow,
    pub participants: Vec<String>,
    pub last_message: Option<MessageRow>,
}
