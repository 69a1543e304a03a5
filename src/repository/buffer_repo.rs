// ==========================================
// 库存缓冲补货系统 - 库存缓冲数据仓储
// ==========================================
// 表: inventory_buffer
// 红线: Repository 不做分区计算, 只按 revision 条件写入
// ==========================================

mod core;
mod queries;


pub use core::InventoryBufferRepository;
