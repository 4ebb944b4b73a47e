mod null_adapter;

pub use null_adapter::NullAvatarAdapter;
