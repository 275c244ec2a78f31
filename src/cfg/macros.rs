//! 由配置结构体构造组件的 `From`/`TryFrom` 实现

/// 为配置类型实现 `From`
///
/// - `impl_from!(Config => Type)`: 调用 `Type::new(config)`
/// - `impl_from!(Config => Type, via: ctor)`: 调用 `Type::ctor(config)`
#[macro_export]
macro_rules! impl_from {
    ($config_type:ty => $target_type:ty) => {
        impl From<$config_type> for $target_type {
            fn from(config: $config_type) -> Self {
                <$target_type>::new(config)
            }
        }
    };

    ($config_type:ty => $target_type:ty, via: $ctor:ident) => {
        impl From<$config_type> for $target_type {
            fn from(config: $config_type) -> Self {
                <$target_type>::$ctor(config)
            }
        }
    };
}

/// 为构造可能失败的类型实现 `TryFrom`，`new` 返回 `anyhow::Result<Self>`
#[macro_export]
macro_rules! impl_try_from {
    ($config_type:ty => $target_type:ty) => {
        impl TryFrom<$config_type> for $target_type {
            type Error = anyhow::Error;

            fn try_from(config: $config_type) -> anyhow::Result<Self> {
                <$target_type>::new(config)
            }
        }
    };
}
