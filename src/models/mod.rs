pub mod alert;
pub mod enums;
pub mod glucose;
pub mod medication;
pub mod patient;
pub mod symptom;

pub use alert::*;
pub use enums::*;
pub use glucose::*;
pub use medication::*;
pub use patient::*;
pub use symptom::*;
