//! Returns domain module.
//!
//! Eligibility of a delivered order for return, refund computation from the
//! order's line snapshots, and the return request aggregate.

pub mod eligibility;
pub mod return_request;

pub use eligibility::{
    build_return_lines, check_eligibility, return_window_end, ReturnLineRequest,
    RETURN_WINDOW_DAYS,
};
pub use return_request::{
    ApproveReturn, RejectReturn, RequestReturn, ReturnApproved, ReturnCommand, ReturnEvent,
    ReturnId, ReturnLine, ReturnRejected, ReturnRequest, ReturnRequested, ReturnStatus,
    RefundUpdated, UpdateRefund,
};
