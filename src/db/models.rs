/// Database row types for all tables.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.

/// User record in the users table
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub bio: String,
    pub profile_pic: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Persisted chat message between two users
#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub sender_id: String,
    pub receiver_id: String,
    pub content_text: Option<String>,
    pub image_url: Option<String>,
    pub seen: bool,
    pub created_at: String,
}
