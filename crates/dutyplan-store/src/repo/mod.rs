//! Repositories over the planner schema.

pub mod assignments;
pub mod floors;
pub mod slots;
pub mod teachers;

pub use assignments::AssignmentRepository;
pub use floors::FloorRepository;
pub use slots::SlotRepository;
pub use teachers::TeacherRepository;
