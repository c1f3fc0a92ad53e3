/// Perform an `eth_call` of a registered contract function and decode its
/// output tokens.
/// if output decoding fails, emit a `WARN` level tracing event
#[macro_export]
macro_rules! view_call {
    ($sender:expr, $contract:expr, $to:expr, $function:expr,) => {
        $crate::view_call!($sender, $contract, $to, $function)
    };
    ($sender:expr, $contract:expr, $to:expr, $function:expr) => {
        $crate::view_call!($sender, $contract, $to, $function, &[])
    };
    ($sender:expr, $contract:expr, $to:expr, $function:expr, $args:expr,) => {
        $crate::view_call!($sender, $contract, $to, $function, $args)
    };
    ($sender:expr, $contract:expr, $to:expr, $function:expr, $args:expr) => {{
        let to: ethers::types::Address = $to;
        let function = $sender.registry().abi($contract)?.function($function)?;
        let data = function.encode_input($args)?;
        tracing::debug!(to = ?to, function = $function, "Dispatching eth_call");
        let raw = $sender.call(to, data.into()).await?;
        match function.decode_output(&raw) {
            Ok(tokens) => Ok::<_, $crate::client::ClientError>(tokens),
            Err(e) => {
                tracing::warn!(
                    to = ?to,
                    function = $function,
                    response = %raw,
                    "Unexpected response from node"
                );
                Err(e.into())
            }
        }
    }};
}

/// Take the next output token and convert it, failing with an ABI error if
/// the node returned fewer or differently typed values
#[macro_export]
macro_rules! next_token {
    ($tokens:expr, $ty:ty) => {{
        let token = $tokens
            .next()
            .ok_or(ethers::abi::Error::InvalidData)?;
        <$ty as ethers::abi::Tokenizable>::from_token(token)
            .map_err(|e| $crate::client::ClientError::Provider(e.to_string()))?
    }};
}
