pub mod finding;
pub mod run;
pub mod page;
pub mod issue;
pub mod baseline;
pub mod site;

pub use finding::*;
pub use run::*;
pub use page::*;
pub use issue::*;
pub use baseline::*;
pub use site::*;
