//! Marketplace records: items, cart lines, orders and the values they carry
use super::error::ValidationError;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

pub type UserId = u64;
pub type ItemId = u64;
pub type OrderId = u64;

/// An amount of money in minor currency units (cents).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: u64) -> Self {
        Self(cents)
    }
    pub fn cents(&self) -> u64 {
        self.0
    }
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
    pub fn checked_mul(self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(u64::from(quantity)).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

/// A listed craft together with its current price and stock.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Item {
    #[n(0)]
    pub id: ItemId,
    #[n(1)]
    pub seller_id: UserId,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub description: Option<String>,
    #[n(4)]
    pub price: Money,
    #[n(5)]
    pub available: u32,
}

/// Price and stock of an item as observed under its row lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub item_id: ItemId,
    pub seller_id: UserId,
    pub title: String,
    pub price: Money,
    pub available: u32,
}

impl From<&Item> for StockLevel {
    fn from(item: &Item) -> Self {
        Self {
            item_id: item.id,
            seller_id: item.seller_id,
            title: item.title.clone(),
            price: item.price,
            available: item.available,
        }
    }
}

// Used for constructing new listings
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ItemDraft {
    title: Option<String>,
    description: Option<String>,
    price: Option<Money>,
    stock: u32,
}

impl ItemDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
    pub fn set_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
    pub fn set_price(mut self, price: Money) -> Self {
        self.price = Some(price);
        self
    }
    pub fn set_stock(mut self, stock: u32) -> Self {
        self.stock = stock;
        self
    }
    /// Checks required fields and produces the item that will be stored under `id`.
    pub fn finalise(self, id: ItemId, seller_id: UserId) -> Result<Item, ValidationError> {
        let title = match self.title {
            Some(title) if !title.trim().is_empty() => title,
            _ => return Err(ValidationError::MissingTitle),
        };
        let price = self.price.ok_or(ValidationError::MissingPrice)?;

        Ok(Item {
            id,
            seller_id,
            title,
            description: self.description,
            price,
            available: self.stock,
        })
    }
}

/// Partial update of a listing; unset fields are left untouched.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ItemUpdate {
    title: Option<String>,
    description: Option<String>,
    price: Option<Money>,
    stock: Option<u32>,
}

impl ItemUpdate {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
    pub fn set_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
    pub fn set_price(mut self, price: Money) -> Self {
        self.price = Some(price);
        self
    }
    pub fn set_stock(mut self, stock: u32) -> Self {
        self.stock = Some(stock);
        self
    }
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.stock.is_none()
    }
    pub fn apply_to(self, item: &mut Item) -> Result<(), ValidationError> {
        if let Some(title) = self.title {
            if title.trim().is_empty() {
                return Err(ValidationError::MissingTitle);
            }
            item.title = title;
        }
        if let Some(description) = self.description {
            item.description = Some(description);
        }
        if let Some(price) = self.price {
            item.price = price;
        }
        if let Some(stock) = self.stock {
            item.available = stock;
        }
        Ok(())
    }
}

/// One buyer's pending selection of an item. The buyer is the key of the cart
/// the line belongs to.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    #[n(0)]
    pub item_id: ItemId,
    #[n(1)]
    pub quantity: u32,
}

impl CartLine {
    pub fn new(item_id: ItemId, quantity: u32) -> Result<Self, ValidationError> {
        if quantity == 0 {
            return Err(ValidationError::ZeroQuantity(item_id));
        }
        Ok(Self { item_id, quantity })
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, Clone, PartialEq, Eq)]
pub struct ShippingInfo {
    #[n(0)]
    pub recipient_name: Option<String>,
    #[n(1)]
    pub address: Option<String>,
    #[n(2)]
    pub phone: Option<String>,
}

impl ShippingInfo {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_recipient_name(mut self, name: impl Into<String>) -> Self {
        self.recipient_name = Some(name.into());
        self
    }
    pub fn set_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
    pub fn set_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Processing,
    #[n(2)]
    Shipped,
    #[n(3)]
    Delivered,
    #[n(4)]
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Forward-only lifecycle: pending -> processing -> shipped -> delivered,
    /// with cancellation possible until the order ships.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            _ => Err(ValidationError::UnknownStatus(s.to_string())),
        }
    }
}

/// A stock-validated line handed to the ledger by the checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub item_id: ItemId,
    pub seller_id: UserId,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    pub fn from_stock(stock: &StockLevel, quantity: u32) -> Self {
        Self {
            item_id: stock.item_id,
            seller_id: stock.seller_id,
            title: stock.title.clone(),
            quantity,
            unit_price: stock.price,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    #[n(0)]
    pub order_id: OrderId,
    #[n(1)]
    pub item_id: ItemId,
    #[n(2)]
    pub seller_id: UserId,
    #[n(3)]
    pub title: String,
    #[n(4)]
    pub quantity: u32,
    #[n(5)]
    pub unit_price: Money, // captured at purchase time
}

impl OrderLine {
    pub fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Order {
    #[n(0)]
    pub id: OrderId,
    #[n(1)]
    pub reference: String, // bech32 encoded uuid7, shown to customers
    #[n(2)]
    pub buyer_id: UserId,
    #[n(3)]
    pub lines: Vec<OrderLine>,
    #[n(4)]
    pub total: Money,
    #[n(5)]
    pub status: OrderStatus,
    #[n(6)]
    pub shipping: ShippingInfo,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
}

impl Order {
    pub fn involves_seller(&self, seller_id: UserId) -> bool {
        self.lines.iter().any(|line| line.seller_id == seller_id)
    }

    /// Recomputes the total from the captured line prices.
    pub fn line_total(&self) -> Option<Money> {
        self.lines
            .iter()
            .try_fold(Money::ZERO, |acc, line| acc.checked_add(line.subtotal()?))
    }
}

impl<C> minicbor::Encode<C> for Money {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.u64(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Money {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Money(d.u64()?))
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn money_arithmetic_is_checked() {
        let price = Money::from_cents(1_999);
        assert_eq!(price.checked_mul(3), Some(Money::from_cents(5_997)));
        assert_eq!(Money::from_cents(u64::MAX).checked_mul(2), None);
        assert_eq!(
            Money::from_cents(u64::MAX).checked_add(Money::from_cents(1)),
            None
        );
        assert_eq!(price.to_string(), "19.99");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn order_encoding() {
        let order = Order {
            id: 7,
            reference: "order_1abc".into(),
            buyer_id: 3,
            lines: vec![OrderLine {
                order_id: 7,
                item_id: 11,
                seller_id: 2,
                title: "Clay mug".into(),
                quantity: 2,
                unit_price: Money::from_cents(1_250),
            }],
            total: Money::from_cents(2_500),
            status: OrderStatus::Pending,
            shipping: ShippingInfo::new().set_recipient_name("Ada"),
            created_at: TimeStamp::new(),
        };

        let encoding = minicbor::to_vec(&order).unwrap();
        let decode: Order = minicbor::decode(&encoding).unwrap();

        assert_eq!(order, decode);
        assert_eq!(decode.line_total(), Some(decode.total));
    }

    #[test]
    fn status_parsing_accepts_either_case() {
        assert_eq!("Pending".parse::<OrderStatus>().unwrap(), OrderStatus::Pending);
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert_eq!("canceled".parse::<OrderStatus>().unwrap(), OrderStatus::Cancelled);
        assert!(matches!(
            "lost".parse::<OrderStatus>(),
            Err(ValidationError::UnknownStatus(_))
        ));
    }

    #[test]
    fn strict_lifecycle() {
        use OrderStatus::*;
        assert!(Pending.can_advance_to(Processing));
        assert!(Processing.can_advance_to(Cancelled));
        assert!(!Shipped.can_advance_to(Cancelled));
        assert!(!Delivered.can_advance_to(Pending));
        assert!(!Pending.can_advance_to(Pending));
        assert!(!Cancelled.can_advance_to(Processing));
    }

    #[test]
    fn draft_requires_title_and_price() {
        let missing_price = ItemDraft::new().set_title("Scarf").finalise(1, 9);
        assert!(matches!(missing_price, Err(ValidationError::MissingPrice)));

        let blank_title = ItemDraft::new()
            .set_title("  ")
            .set_price(Money::from_cents(100))
            .finalise(1, 9);
        assert!(matches!(blank_title, Err(ValidationError::MissingTitle)));

        let item = ItemDraft::new()
            .set_title("Scarf")
            .set_price(Money::from_cents(4_000))
            .set_stock(4)
            .finalise(1, 9)
            .unwrap();
        assert_eq!(item.available, 4);
        assert_eq!(item.seller_id, 9);
    }

    #[test]
    fn cart_line_rejects_zero_quantity() {
        assert!(matches!(
            CartLine::new(4, 0),
            Err(ValidationError::ZeroQuantity(4))
        ));
        assert_eq!(CartLine::new(4, 2).unwrap().quantity, 2);
    }
}
