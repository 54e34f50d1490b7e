use serde::{Deserialize, Serialize};

/// Speaker tag on a transcript utterance. Voice transports disagree on
/// naming ("assistant"/"bot" vs "user"/"human"), so common spellings are
/// accepted and anything unrecognized lands on `System`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "assistant", alias = "bot", alias = "ai")]
    Interviewer,
    #[serde(alias = "user", alias = "human")]
    Candidate,
    #[serde(other)]
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub role: Role,
    pub content: String,
}
