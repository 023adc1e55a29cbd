use contract_utils::syscalls::Notification;
use contract_utils::Address;
use fvm_ipld_encoding::tuple::{Deserialize_tuple, Serialize_tuple};
use fvm_ipld_encoding::RawBytes;
use fvm_shared::econ::TokenAmount;

/// A standard fungible token interface implementing the OEP-4 standard. This represents the
/// external interface exposed to callers of the token contract
///
/// Methods that change state return a typed value on success and a `TokenError` describing the
/// rejection otherwise; the dispatch layer turns these into the boolean results the standard
/// prescribes.
pub trait OEP4Token {
    type TokenError;

    /// Credits the configured owner with the entire supply
    ///
    /// Can only succeed once over the lifetime of the token.
    fn init(&mut self) -> Result<InitReturn, Self::TokenError>;

    /// Returns the name of the token
    fn name(&self) -> String;

    /// Returns the ticker symbol of the token
    fn symbol(&self) -> String;

    /// Returns the number of decimal places used to display amounts
    fn decimals(&self) -> DecimalsReturn;

    /// Returns the total amount of the token in existence, zero before initialization
    fn total_supply(&self) -> Result<TotalSupplyReturn, Self::TokenError>;

    /// Returns the balance of an address
    ///
    /// Balance is always non-negative. Addresses that never received tokens have an implicit zero
    /// balance.
    fn balance_of(&self, params: Address) -> Result<BalanceReturn, Self::TokenError>;

    /// Transfers tokens between two addresses. The caller must control `from`
    fn transfer(&mut self, params: TransferParams) -> Result<TransferReturn, Self::TokenError>;

    /// Applies a sequence of transfers atomically: either all of them take effect or none do
    fn transfer_multi(
        &mut self,
        params: TransferMultiParams,
    ) -> Result<TransferMultiReturn, Self::TokenError>;

    /// Sets the amount a spender may withdraw from the owner's balance, replacing any previous
    /// allowance. The caller must control `owner`
    fn approve(&mut self, params: ApproveParams) -> Result<ApproveReturn, Self::TokenError>;

    /// Returns the amount a spender may still withdraw from an owner's balance
    fn allowance(&self, params: GetAllowanceParams) -> Result<AllowanceReturn, Self::TokenError>;

    /// Transfers tokens out of an owner's balance on the strength of an allowance. The caller must
    /// control `spender`
    fn transfer_from(
        &mut self,
        params: TransferFromParams,
    ) -> Result<TransferFromReturn, Self::TokenError>;
}

pub type DecimalsReturn = u8;
pub type TotalSupplyReturn = TokenAmount;
pub type BalanceReturn = TokenAmount;
pub type AllowanceReturn = TokenAmount;
pub type TransferMultiReturn = ();
/// The allowance that was replaced by the approval
pub type ApproveReturn = TokenAmount;

/// Instruction to move `amount` from `from` to `to`
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TransferParams {
    pub from: Address,
    pub to: Address,
    pub amount: TokenAmount,
}

impl TransferParams {
    pub fn new(from: Address, to: Address, amount: TokenAmount) -> Self {
        Self { from, to, amount }
    }
}

/// Ordered batch of transfers
pub type TransferMultiParams = Vec<TransferParams>;

#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct ApproveParams {
    pub owner: Address,
    pub spender: Address,
    pub amount: TokenAmount,
}

#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct GetAllowanceParams {
    pub owner: Address,
    pub spender: Address,
}

#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TransferFromParams {
    pub spender: Address,
    pub from: Address,
    pub to: Address,
    pub amount: TokenAmount,
}

/// Return value after a successful initialization
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct InitReturn {
    /// The account credited with the supply
    pub owner: Address,
    /// The total supply
    pub supply: TokenAmount,
}

/// Return value after a successful transfer
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TransferReturn {
    /// The new balance of the `from` address
    pub from_balance: TokenAmount,
    /// The new balance of the `to` address
    pub to_balance: TokenAmount,
}

/// Return value after a successful delegated transfer
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TransferFromReturn {
    /// The new balance of the `from` address
    pub from_balance: TokenAmount,
    /// The new balance of the `to` address
    pub to_balance: TokenAmount,
    /// The remaining allowance between `from` and the spender
    pub allowance: TokenAmount,
}

pub const TRANSFER_EVENT: &str = "transfer";
pub const APPROVAL_EVENT: &str = "approval";

/// Payload of a transfer notification. `from` is absent for the initial issuance
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TransferNotification {
    pub from: Option<Address>,
    pub to: Address,
    pub amount: TokenAmount,
}

/// Payload of an approval notification
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct ApprovalNotification {
    pub owner: Address,
    pub spender: Address,
    pub amount: TokenAmount,
}

/// Events published by the token after a state change has been committed
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum TokenEvent {
    Transfer(TransferNotification),
    Approval(ApprovalNotification),
}

impl TokenEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TokenEvent::Transfer(_) => TRANSFER_EVENT,
            TokenEvent::Approval(_) => APPROVAL_EVENT,
        }
    }

    /// Encodes the event for publishing through the runtime
    pub fn to_notification(&self) -> Result<Notification, fvm_ipld_encoding::Error> {
        let payload = match self {
            TokenEvent::Transfer(params) => RawBytes::serialize(params)?,
            TokenEvent::Approval(params) => RawBytes::serialize(params)?,
        };
        Ok(Notification { name: self.name().to_string(), payload })
    }

    /// Decodes a published notification. Returns None for notifications this token doesn't emit
    pub fn from_notification(
        notification: &Notification,
    ) -> Result<Option<Self>, fvm_ipld_encoding::Error> {
        let event = match notification.name.as_str() {
            TRANSFER_EVENT => Some(TokenEvent::Transfer(notification.payload.deserialize()?)),
            APPROVAL_EVENT => Some(TokenEvent::Approval(notification.payload.deserialize()?)),
            _ => None,
        };
        Ok(event)
    }
}

#[cfg(test)]
mod test {
    use contract_utils::syscalls::Notification;
    use contract_utils::Address;
    use fvm_shared::econ::TokenAmount;

    use super::{ApprovalNotification, TokenEvent, TransferNotification};

    #[test]
    fn it_encodes_events_as_notifications() {
        let event = TokenEvent::Transfer(TransferNotification {
            from: None,
            to: Address::new([1; 20]),
            amount: TokenAmount::from_atto(100),
        });
        let notification = event.to_notification().unwrap();
        assert_eq!(notification.name, "transfer");
        assert_eq!(TokenEvent::from_notification(&notification).unwrap(), Some(event));

        let event = TokenEvent::Approval(ApprovalNotification {
            owner: Address::new([1; 20]),
            spender: Address::new([2; 20]),
            amount: TokenAmount::from_atto(5),
        });
        let notification = event.to_notification().unwrap();
        assert_eq!(notification.name, "approval");
        assert_eq!(TokenEvent::from_notification(&notification).unwrap(), Some(event));
    }

    #[test]
    fn it_ignores_foreign_notifications() {
        let notification = Notification { name: "other".into(), payload: Default::default() };
        assert_eq!(TokenEvent::from_notification(&notification).unwrap(), None);
    }
}
