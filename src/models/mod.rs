pub mod receipt;
pub mod role;
pub mod tag;
pub mod user;

pub use receipt::{
    CreateReceipt, NewReceipt, PaymentMode, Receipt, ReceiptRecord, RecentReceipt, TagReceipt,
    Uploader, UploaderName, DEFAULT_CATEGORY,
};
pub use role::Role;
pub use tag::{Tag, TagKey};
pub use user::{ChangePassword, CreateUser, LoginRequest, UserResponse, UserWithRoles};
