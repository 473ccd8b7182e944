use uuid::Uuid;

/// Use the caller-provided client id when present, otherwise mint a short
/// readable one like `client-a3f2` so anonymous connections stay traceable
/// in the logs.
pub fn client_or_generated(client_id: Option<String>) -> String {
    match client_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => {
            let uuid = Uuid::new_v4().simple().to_string();
            format!("client-{}", &uuid[..4])
        }
    }
}
