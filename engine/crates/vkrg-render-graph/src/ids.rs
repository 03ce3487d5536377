//! graph 中对象的标识
//!
//! - UUID：operation 与资源的稳定标识，跨越重新编译保持不变
//! - slotmap key：graph 内部 arena 的句柄

/// 生成基于 uuid::Uuid 的新类型
macro_rules! uuid_new_type {
    ($vis:vis $name:ident) => {
        #[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Debug)]
        $vis struct $name(pub uuid::Uuid);

        impl $name {
            #[inline]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            #[inline]
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_new_type!(pub RgOperationId);
uuid_new_type!(pub RgResourceId);

slotmap::new_key_type! {
    /// graph 中资源的句柄
    pub struct RgResourceHandle;
    /// graph 中 operation 的句柄
    pub struct RgOperationHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = RgOperationId::new();
        let b = RgOperationId::new();
        assert_ne!(a, b);
        assert_eq!(RgOperationId::from(*a.as_uuid()), a);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }
}
