// ==========================================
// 产品登记同步系统 - 数据仓储层
// ==========================================
// 职责: 数据访问，不含业务逻辑
// ==========================================

pub mod checkpoint_repo;
pub mod error;
pub mod product_repo;
pub mod product_repo_impl;

pub use checkpoint_repo::{CheckpointRepository, CheckpointRepositoryImpl};
pub use error::{RepositoryError, RepositoryResult};
pub use product_repo::ProductRepository;
pub use product_repo_impl::ProductRepositoryImpl;
