//! Logs Insights query texts.
//!
//! Every query projects its columns in the same order: `TenantId`, `Service`,
//! the metric column, then `timestamp`. The transformer reads exactly that
//! prefix, so a change here must keep the column order.
//!
//! Capacity units are weighted inside the query: a created or updated item is
//! one unit, a retrieved item half a unit, and `coalesce` picks whichever of
//! the three counters the log line carries.

pub const INVOCATION_QUERY: &str = "fields @timestamp, @message \
| filter @message like /Request completed/ \
| fields tenant_id as TenantId, service as Service \
| stats count (TenantId) as LambdaInvocation by TenantId, Service, dateceil(@timestamp, 1d) as timestamp";

pub const PRODUCT_CAPACITY_QUERY: &str = "fields @timestamp, @message \
| filter @message like /ProductCreated|ProductUpdated|ProductsRetrieved/ \
| fields tenant_id as TenantId, service as Service, \
ProductCreated.0 as ProductCreated, ProductUpdated.0 as ProductUpdated, \
ProductsRetrieved.0*0.5 as ProductsRetrieved \
| display coalesce(ProductCreated, ProductUpdated, ProductsRetrieved) as ProductUnits \
| stats sum(ProductUnits) as CapacityUnits by TenantId, Service, dateceil(@timestamp, 1d) as timestamp";

pub const ORDER_CAPACITY_QUERY: &str = "fields @timestamp, @message \
| filter @message like /OrderCreated|OrderUpdated|OrdersRetrieved/ \
| fields tenant_id as TenantId, service as Service, \
OrderCreated.0 as OrderCreated, OrderUpdated.0 as OrderUpdated, \
OrdersRetrieved.0*0.5 as OrdersRetrieved \
| display coalesce(OrderCreated, OrderUpdated, OrdersRetrieved) as OrderUnits \
| stats sum(OrderUnits) as CapacityUnits by TenantId, Service, dateceil(@timestamp, 1d) as timestamp";
