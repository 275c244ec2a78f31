use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// 错误类别：层级化的路径，如 `["loader", "decode"]`
///
/// 类别之间按前缀判断归属，`loader.decode` 属于 `loader`，反之不成立
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Class(Vec<String>);

impl Class {
    /// 创建一个独立的类别层级
    pub fn new(path: &[&str]) -> Self {
        Self::default().sub(path)
    }

    /// 在当前类别下派生子类别
    pub fn sub(&self, path: &[&str]) -> Self {
        let mut segments = self.0.clone();
        segments.extend(path.iter().map(|s| s.to_string()));
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// 当前类别是否等于 `parent` 或是它的后代
    pub fn is(&self, parent: &Class) -> bool {
        self.0.starts_with(&parent.0)
    }

    /// 判断 anyhow 错误是否属于当前类别
    ///
    /// 沿错误链查找第一个带类别标签的错误，由它的类别决定结果
    pub fn contains(&self, err: &anyhow::Error) -> bool {
        self.contains_error(&**err)
    }

    /// 判断标准库错误是否属于当前类别
    pub fn contains_error(&self, err: &(dyn StdError + 'static)) -> bool {
        let mut current = Some(err);
        while let Some(e) = current {
            if let Some(classed) = e.downcast_ref::<ClassError>() {
                return classed.class().is(self);
            }
            current = e.source();
        }
        false
    }

    /// 用当前类别包装错误，原错误作为 cause 保留在错误链中
    pub fn wrap<E>(&self, err: E, message: impl fmt::Display) -> ClassError
    where
        E: Into<anyhow::Error>,
    {
        ClassError::new(self.clone(), message.to_string(), Some(err.into()))
    }

    /// 创建一个属于当前类别、没有 cause 的错误
    pub fn error(&self, message: impl fmt::Display) -> ClassError {
        ClassError::new(self.clone(), message.to_string(), None)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// 带类别标签的错误
///
/// 创建后不再修改；cause 通过 `source()` 暴露，可被 `Class::contains` 逐层遍历。
/// 内部以 `Arc` 持有 cause，因此可以廉价克隆，用于构造阶段捕获、每次 load 重复返回的错误
#[derive(Clone)]
pub struct ClassError {
    class: Class,
    message: String,
    cause: Option<Arc<anyhow::Error>>,
    backtrace: Arc<Backtrace>,
}

impl ClassError {
    fn new(class: Class, message: String, cause: Option<anyhow::Error>) -> Self {
        Self {
            class,
            message,
            cause: cause.map(Arc::new),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    pub fn class(&self) -> &Class {
        &self.class
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 创建错误时捕获的调用栈（受 `RUST_BACKTRACE` 控制）
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for ClassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class.segments().is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.class, self.message)
        }
    }
}

impl fmt::Debug for ClassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassError")
            .field("class", &self.class.to_string())
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(|e| format!("{:#}", e)))
            .finish()
    }
}

impl StdError for ClassError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_ref().map(|e| {
            let inner: &(dyn StdError + 'static) = &***e;
            inner
        })
    }
}

/// 为 `Result` 提供按类别包装错误的能力，`Ok` 原样透传
pub trait WrapErr<T> {
    fn wrap_err<M>(self, class: &Class, message: M) -> anyhow::Result<T>
    where
        M: fmt::Display;

    fn wrap_err_with<M, F>(self, class: &Class, f: F) -> anyhow::Result<T>
    where
        M: fmt::Display,
        F: FnOnce() -> M;
}

impl<T, E> WrapErr<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn wrap_err<M>(self, class: &Class, message: M) -> anyhow::Result<T>
    where
        M: fmt::Display,
    {
        self.map_err(|e| class.wrap(e, message).into())
    }

    fn wrap_err_with<M, F>(self, class: &Class, f: F) -> anyhow::Result<T>
    where
        M: fmt::Display,
        F: FnOnce() -> M,
    {
        self.map_err(|e| class.wrap(e, f()).into())
    }
}
