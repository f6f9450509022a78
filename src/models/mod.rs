mod company;
mod forecast;
mod price_point;
mod report;

pub use company::{Company, CompanyTable};
pub use forecast::{ArimaOrder, ForecastMetrics, ForecastMode, ForecastPoint, PredictedPrice};
pub use price_point::{PricePoint, PriceSeries};
pub use report::{BatchReport, CompanyOutcome};
