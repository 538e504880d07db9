//! Tipos de resposta do coletor remoto.

use serde::{Deserialize, Serialize};

/// Corpo JSON opcional de uma resposta bem-sucedida do coletor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorReply {
    /// Mensagem de confirmação legível.
    #[serde(default)]
    pub message: Option<String>,
    /// Identificador atribuído pelo coletor, quando houver.
    #[serde(default)]
    pub id: Option<String>,
}

impl CollectorReply {
    /// Texto de confirmação exibido no log do batch.
    ///
    /// Usa `message` quando presente; caso contrário, o corpo bruto.
    pub fn confirmation(body: &str) -> String {
        let trimmed = body.trim();
        match serde_json::from_str::<CollectorReply>(trimmed) {
            Ok(CollectorReply {
                message: Some(message),
                ..
            }) => message,
            Ok(CollectorReply { id: Some(id), .. }) => format!("Accepted ({id})"),
            _ if trimmed.is_empty() => "Accepted".to_string(),
            _ => trimmed.to_string(),
        }
    }
}
