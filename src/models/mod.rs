pub mod artifact;
pub mod credentials;

pub use artifact::{Artifact, ArtifactState};
pub use credentials::{CredentialsRecord, PairRequest, PairResponse};
